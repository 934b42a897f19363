use crate::core::config::MarkerConfig;
use crate::core::geom::Point;
use crate::core::viewport::Viewport;
use crate::input::events::PointerId;
use crate::markers::poi::{decode_records, decode_types, MarkerTypeInfo, PoiId, PoiMarker};
use crate::markers::service::{
    PoiAction, PoiOutcome, PoiRequest, PoiTransport, RequestId, ServiceError,
};
use crate::markers::visited::VisitedStore;
use crate::render::{RenderSurface, VisualId, VisualKind};
use fxhash::{FxHashMap, FxHashSet};
use serde_json::json;

/// The source marker disappears behind its ghost for the whole drag (and
/// stays hidden while a delete awaits confirmation)
const DRAG_HIDDEN_OPACITY: f64 = 0.0;

/// What a drag session is doing
#[derive(Debug, Clone)]
enum DragKind {
    /// Dragging a brand-new marker out of the palette
    Create { marker_type: u32 },
    /// Relocating an existing marker; `origin` is its pre-drag normalized
    /// position, kept for revert
    Move { id: PoiId, origin: (f64, f64) },
}

#[derive(Debug)]
struct DragState {
    kind: DragKind,
    pointer_id: PointerId,
    ghost: VisualId,
}

/// What [`MarkerController::pointer_move`] did with the event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveOutcome {
    /// The ghost followed the pointer, or a tap candidate is still within slop
    Consumed,
    /// The move travelled past the tap slop; the original press position is
    /// handed back so the contact can start panning from where it went down
    TapDissolved { press: Point },
    /// Not a pointer this controller owns
    Unclaimed,
}

/// A press on a marker that may still become a visited-toggle tap
#[derive(Debug)]
struct TapCandidate {
    pointer_id: PointerId,
    id: PoiId,
    start: Point,
    started_at: instant::Instant,
}

/// Where a drag ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DropZone {
    /// Released over the map at this screen position
    Map(Point),
    /// Released over the trash target
    Trash,
    /// Released outside the viewport
    Outside,
}

/// Supplies an auth token when the backend demands one.
///
/// Returning `None` abandons the mutation.
pub trait CredentialPrompt {
    fn request_token(&mut self) -> Option<String>;
}

#[derive(Debug, Clone)]
enum PendingMutation {
    /// Not yet rendered; the marker appears when the server confirms
    Create { marker: PoiMarker },
    Move { id: PoiId, origin: (f64, f64) },
    Delete { id: PoiId },
}

struct PendingEntry {
    mutation: PendingMutation,
    request: PoiRequest,
    auth_retries: u32,
}

/// Owns marker state and the drag/tap interaction machine.
///
/// Moves are optimistic: the marker lands at the drop point immediately and
/// a rejection snaps it back with an alert. Creates and deletes are not:
/// a new marker only appears, and a trashed one only disappears, once the
/// server confirms.
pub struct MarkerController {
    config: MarkerConfig,
    map_name: String,
    edit_mode: bool,
    markers: FxHashMap<PoiId, PoiMarker>,
    visuals: FxHashMap<PoiId, VisualId>,
    visited: FxHashSet<PoiId>,
    visited_store: Box<dyn VisitedStore>,
    token: Option<String>,
    drag: Option<DragState>,
    tap: Option<TapCandidate>,
    pending: FxHashMap<RequestId, PendingEntry>,
    list_request: Option<RequestId>,
    types_request: Option<RequestId>,
    marker_types: Vec<MarkerTypeInfo>,
}

impl MarkerController {
    pub fn new(config: MarkerConfig, map_name: impl Into<String>, store: Box<dyn VisitedStore>) -> Self {
        let map_name = map_name.into();
        let visited = store.load(&map_name);
        Self {
            config,
            map_name,
            edit_mode: false,
            markers: FxHashMap::default(),
            visuals: FxHashMap::default(),
            visited,
            visited_store: store,
            token: None,
            drag: None,
            tap: None,
            pending: FxHashMap::default(),
            list_request: None,
            types_request: None,
            marker_types: Vec::new(),
        }
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn set_edit_mode(&mut self, edit_mode: bool) {
        self.edit_mode = edit_mode;
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker(&self, id: &PoiId) -> Option<&PoiMarker> {
        self.markers.get(id)
    }

    pub fn is_visited(&self, id: &PoiId) -> bool {
        self.visited.contains(id)
    }

    /// The pointer a drag session owns, if one is active
    pub fn drag_pointer(&self) -> Option<PointerId> {
        self.drag.as_ref().map(|d| d.pointer_id)
    }

    /// True when this pointer belongs to a drag or tap candidate
    pub fn owns_pointer(&self, pointer_id: PointerId) -> bool {
        self.drag.as_ref().map(|d| d.pointer_id) == Some(pointer_id)
            || self.tap.as_ref().map(|t| t.pointer_id) == Some(pointer_id)
    }

    /// Icon edge length in screen pixels at the current zoom
    pub fn icon_size(&self, viewport: &Viewport) -> f64 {
        self.config.min_size_px
            + viewport.zoom_progress() * (self.config.max_size_px - self.config.min_size_px)
    }

    /// A marker whose icon covers `screen`, if any. Overlapping icons resolve
    /// to an arbitrary one of them.
    pub fn hit_test(&self, screen: Point, viewport: &Viewport) -> Option<PoiId> {
        let half = self.icon_size(viewport) / 2.0;
        self.markers.values().find_map(|marker| {
            let center = viewport.map_to_screen(viewport.denormalize(Point::new(marker.x, marker.y)));
            let dx = (screen.x - center.x).abs();
            let dy = (screen.y - center.y).abs();
            (dx <= half && dy <= half).then(|| marker.id.clone())
        })
    }

    /// Press landed on a marker. In edit mode this starts a move drag; in view
    /// mode it arms a visited-toggle tap.
    pub fn pointer_down_on_marker<S: RenderSurface>(
        &mut self,
        pointer_id: PointerId,
        position: Point,
        id: PoiId,
        viewport: &Viewport,
        surface: &mut S,
    ) {
        if self.edit_mode {
            let Some(marker) = self.markers.get(&id) else {
                return;
            };
            let origin = (marker.x, marker.y);
            let marker_type = marker.marker_type;
            self.abort_drag(surface);

            let ghost = surface.create_visual(VisualKind::Ghost { marker_type }, true);
            self.place_ghost(ghost, position, viewport, surface);
            if let Some(&visual) = self.visuals.get(&id) {
                surface.set_opacity(visual, DRAG_HIDDEN_OPACITY);
            }
            self.drag = Some(DragState {
                kind: DragKind::Move { id, origin },
                pointer_id,
                ghost,
            });
        } else {
            self.tap = Some(TapCandidate {
                pointer_id,
                id,
                start: position,
                started_at: instant::Instant::now(),
            });
        }
    }

    /// Starts dragging a new marker out of the palette. Only one drag can be
    /// active; starting another reverts the first.
    pub fn begin_create_drag<S: RenderSurface>(
        &mut self,
        pointer_id: PointerId,
        position: Point,
        marker_type: u32,
        viewport: &Viewport,
        surface: &mut S,
    ) {
        if !self.edit_mode {
            return;
        }
        self.abort_drag(surface);

        let ghost = surface.create_visual(VisualKind::Ghost { marker_type }, true);
        self.place_ghost(ghost, position, viewport, surface);
        self.drag = Some(DragState {
            kind: DragKind::Create { marker_type },
            pointer_id,
            ghost,
        });
    }

    /// Routes a move for a pointer this controller owns
    pub fn pointer_move<S: RenderSurface>(
        &mut self,
        pointer_id: PointerId,
        position: Point,
        viewport: &Viewport,
        surface: &mut S,
    ) -> MoveOutcome {
        if let Some(tap) = &self.tap {
            if tap.pointer_id == pointer_id {
                if tap.start.distance_to(&position) > self.config.tap_slop {
                    let press = tap.start;
                    self.tap = None;
                    return MoveOutcome::TapDissolved { press };
                }
                return MoveOutcome::Consumed;
            }
        }

        match &self.drag {
            Some(drag) if drag.pointer_id == pointer_id => {
                self.place_ghost(drag.ghost, position, viewport, surface);
                MoveOutcome::Consumed
            }
            _ => MoveOutcome::Unclaimed,
        }
    }

    /// Completes the tap or drag owned by `pointer_id`. Returns false if the
    /// pointer is not ours.
    pub fn pointer_up<S: RenderSurface>(
        &mut self,
        pointer_id: PointerId,
        zone: DropZone,
        viewport: &Viewport,
        transport: &dyn PoiTransport,
        surface: &mut S,
    ) -> bool {
        if let Some(tap) = self.tap.take() {
            if tap.pointer_id == pointer_id {
                let within_time = tap.started_at.elapsed().as_millis() as u64
                    <= self.config.tap_timeout_ms;
                if within_time {
                    self.toggle_visited(&tap.id, surface);
                }
                return true;
            }
            self.tap = Some(tap);
        }

        let drag = match self.drag.take() {
            Some(drag) if drag.pointer_id == pointer_id => drag,
            other => {
                self.drag = other;
                return false;
            }
        };
        surface.remove(drag.ghost);

        match drag.kind {
            DragKind::Create { marker_type } => {
                if let DropZone::Map(position) = zone {
                    self.commit_create(marker_type, position, viewport, transport);
                }
                // Trash/Outside drops of a new marker are silent no-ops
            }
            DragKind::Move { id, origin } => match zone {
                DropZone::Map(position) => {
                    self.commit_move(id, origin, position, viewport, transport, surface)
                }
                DropZone::Trash => self.commit_delete(id, transport),
                DropZone::Outside => self.revert_move(&id, origin, viewport, surface),
            },
        }
        true
    }

    /// Platform aborted the pointer: revert whatever it was doing
    pub fn pointer_cancel<S: RenderSurface>(
        &mut self,
        pointer_id: PointerId,
        viewport: &Viewport,
        surface: &mut S,
    ) -> bool {
        if self.tap.as_ref().map(|t| t.pointer_id) == Some(pointer_id) {
            self.tap = None;
            return true;
        }
        if self.drag.as_ref().map(|d| d.pointer_id) == Some(pointer_id) {
            self.abort_drag_with_viewport(viewport, surface);
            return true;
        }
        false
    }

    /// Asks the backend for this map's marker list
    pub fn request_list(&mut self, transport: &dyn PoiTransport) {
        let request_id = transport.submit(PoiRequest {
            action: PoiAction::List,
            map: self.map_name.clone(),
            token: self.token.clone(),
            payload: json!({}),
        });
        self.list_request = Some(request_id);
    }

    /// Asks the backend for the marker type catalog
    pub fn request_types(&mut self, transport: &dyn PoiTransport) {
        let request_id = transport.submit(PoiRequest {
            action: PoiAction::Types,
            map: self.map_name.clone(),
            token: self.token.clone(),
            payload: json!({}),
        });
        self.types_request = Some(request_id);
    }

    pub fn marker_types(&self) -> &[MarkerTypeInfo] {
        &self.marker_types
    }

    /// Drains service outcomes: applies confirmations, retries auth failures
    /// through `prompt`, reverts rejections. Returns true when markers
    /// changed.
    pub fn poll_service<S: RenderSurface>(
        &mut self,
        viewport: &Viewport,
        transport: &dyn PoiTransport,
        prompt: &mut dyn CredentialPrompt,
        surface: &mut S,
    ) -> bool {
        let mut changed = false;
        for outcome in transport.poll() {
            changed |= self.handle_outcome(outcome, viewport, transport, prompt, surface);
        }
        changed
    }

    /// Positions every marker visual for the current transform
    pub fn render<S: RenderSurface>(&self, viewport: &Viewport, surface: &mut S) {
        let size = self.icon_size(viewport);
        for (id, marker) in &self.markers {
            let Some(&visual) = self.visuals.get(id) else {
                continue;
            };
            let center = viewport.map_to_screen(viewport.denormalize(Point::new(marker.x, marker.y)));
            surface.place(visual, center.x - size / 2.0, center.y - size / 2.0, size, size);
        }
    }

    /// Removes all visuals and persists visited flags
    pub fn teardown<S: RenderSurface>(&mut self, surface: &mut S) {
        self.abort_drag(surface);
        for (_, visual) in self.visuals.drain() {
            surface.remove(visual);
        }
        self.markers.clear();
        self.visited_store.save(&self.map_name, &self.visited);
    }

    fn toggle_visited<S: RenderSurface>(&mut self, id: &PoiId, surface: &mut S) {
        if !self.markers.contains_key(id) {
            return;
        }
        let now_visited = if self.visited.remove(id) {
            false
        } else {
            self.visited.insert(id.clone());
            true
        };
        if let Some(&visual) = self.visuals.get(id) {
            surface.set_visited(visual, now_visited);
        }
        self.visited_store.save(&self.map_name, &self.visited);
    }

    fn commit_create(
        &mut self,
        marker_type: u32,
        position: Point,
        viewport: &Viewport,
        transport: &dyn PoiTransport,
    ) {
        let norm = viewport.normalize(viewport.screen_to_map(position));
        let marker = PoiMarker {
            id: match PoiId::generate() {
                Ok(id) => id,
                Err(err) => {
                    log::error!("cannot mint marker id: {err}");
                    return;
                }
            },
            marker_type,
            x: norm.x,
            y: norm.y,
        };
        if !marker.is_valid() {
            // Dropped past the map edge
            return;
        }

        let request = PoiRequest {
            action: PoiAction::Create,
            map: self.map_name.clone(),
            token: self.token.clone(),
            payload: match serde_json::to_value(&marker) {
                Ok(value) => value,
                Err(err) => {
                    log::error!("cannot encode marker: {err}");
                    return;
                }
            },
        };

        // Nothing rendered yet; the marker appears on confirmation
        let request_id = transport.submit(request.clone());
        self.pending.insert(
            request_id,
            PendingEntry {
                mutation: PendingMutation::Create { marker },
                request,
                auth_retries: 0,
            },
        );
    }

    fn commit_move<S: RenderSurface>(
        &mut self,
        id: PoiId,
        origin: (f64, f64),
        position: Point,
        viewport: &Viewport,
        transport: &dyn PoiTransport,
        surface: &mut S,
    ) {
        let norm = viewport.normalize(viewport.screen_to_map(position));
        if !norm.x.is_finite() || !norm.y.is_finite() || !(0.0..=1.0).contains(&norm.x)
            || !(0.0..=1.0).contains(&norm.y)
        {
            self.revert_move(&id, origin, viewport, surface);
            return;
        }

        let Some(marker) = self.markers.get_mut(&id) else {
            return;
        };
        marker.x = norm.x;
        marker.y = norm.y;

        if let Some(&visual) = self.visuals.get(&id) {
            surface.set_opacity(visual, 1.0);
        }
        self.render(viewport, surface);

        let request = PoiRequest {
            action: PoiAction::Update,
            map: self.map_name.clone(),
            token: self.token.clone(),
            payload: json!({ "id": id.as_str(), "x": norm.x, "y": norm.y }),
        };
        let request_id = transport.submit(request.clone());
        self.pending.insert(
            request_id,
            PendingEntry {
                mutation: PendingMutation::Move { id, origin },
                request,
                auth_retries: 0,
            },
        );
    }

    fn commit_delete(&mut self, id: PoiId, transport: &dyn PoiTransport) {
        // Local removal waits for confirmation; the marker stays hidden
        // (opacity 0 since drag start) in the meantime.
        let request = PoiRequest {
            action: PoiAction::Delete,
            map: self.map_name.clone(),
            token: self.token.clone(),
            payload: json!({ "id": id.as_str() }),
        };
        let request_id = transport.submit(request.clone());
        self.pending.insert(
            request_id,
            PendingEntry {
                mutation: PendingMutation::Delete { id },
                request,
                auth_retries: 0,
            },
        );
    }

    fn revert_move<S: RenderSurface>(
        &mut self,
        id: &PoiId,
        origin: (f64, f64),
        viewport: &Viewport,
        surface: &mut S,
    ) {
        if let Some(marker) = self.markers.get_mut(id) {
            marker.x = origin.0;
            marker.y = origin.1;
        }
        if let Some(&visual) = self.visuals.get(id) {
            surface.set_opacity(visual, 1.0);
        }
        self.render(viewport, surface);
    }

    fn abort_drag<S: RenderSurface>(&mut self, surface: &mut S) {
        if let Some(drag) = self.drag.take() {
            surface.remove(drag.ghost);
            if let DragKind::Move { id, .. } = drag.kind {
                if let Some(&visual) = self.visuals.get(&id) {
                    surface.set_opacity(visual, 1.0);
                }
            }
        }
    }

    fn abort_drag_with_viewport<S: RenderSurface>(&mut self, viewport: &Viewport, surface: &mut S) {
        if let Some(drag) = self.drag.take() {
            surface.remove(drag.ghost);
            if let DragKind::Move { id, origin } = drag.kind {
                self.revert_move(&id, origin, viewport, surface);
            }
        }
    }

    fn insert_visual<S: RenderSurface>(&mut self, marker: &PoiMarker, surface: &mut S) {
        let visual = surface.create_visual(
            VisualKind::Marker {
                marker_type: marker.marker_type,
            },
            true,
        );
        surface.set_visited(visual, self.visited.contains(&marker.id));
        self.visuals.insert(marker.id.clone(), visual);
    }

    fn place_ghost<S: RenderSurface>(
        &self,
        ghost: VisualId,
        position: Point,
        viewport: &Viewport,
        surface: &mut S,
    ) {
        let size = self.icon_size(viewport);
        surface.place(ghost, position.x - size / 2.0, position.y - size / 2.0, size, size);
    }

    fn handle_outcome<S: RenderSurface>(
        &mut self,
        outcome: PoiOutcome,
        viewport: &Viewport,
        transport: &dyn PoiTransport,
        prompt: &mut dyn CredentialPrompt,
        surface: &mut S,
    ) -> bool {
        if self.list_request == Some(outcome.request_id) {
            self.list_request = None;
            match outcome.result {
                Ok(data) => {
                    self.apply_list(&data, viewport, surface);
                    return true;
                }
                Err(err) => {
                    log::warn!("marker list failed: {err}");
                    surface.alert("Could not load markers");
                    return false;
                }
            }
        }

        if self.types_request == Some(outcome.request_id) {
            self.types_request = None;
            match outcome.result {
                Ok(data) => self.marker_types = decode_types(&data),
                Err(err) => log::warn!("marker type catalog failed: {err}"),
            }
            return false;
        }

        let Some(entry) = self.pending.remove(&outcome.request_id) else {
            return false;
        };

        match outcome.result {
            Ok(_) => self.confirm(entry.mutation, viewport, surface),
            Err(ServiceError::AuthRequired) => {
                if entry.auth_retries < self.config.auth_retry_limit {
                    if let Some(token) = prompt.request_token() {
                        self.token = Some(token.clone());
                        let mut request = entry.request.clone();
                        request.token = Some(token);
                        let request_id = transport.submit(request.clone());
                        self.pending.insert(
                            request_id,
                            PendingEntry {
                                mutation: entry.mutation,
                                request,
                                auth_retries: entry.auth_retries + 1,
                            },
                        );
                        return false;
                    }
                }
                surface.alert("Not authorized to edit markers");
                self.revert(entry.mutation, viewport, surface)
            }
            Err(err) => {
                log::warn!("marker mutation failed: {err}");
                surface.alert("Marker change was rejected");
                self.revert(entry.mutation, viewport, surface)
            }
        }
    }

    fn confirm<S: RenderSurface>(
        &mut self,
        mutation: PendingMutation,
        viewport: &Viewport,
        surface: &mut S,
    ) -> bool {
        match mutation {
            PendingMutation::Create { marker } => {
                self.insert_visual(&marker, surface);
                self.markers.insert(marker.id.clone(), marker);
                self.render(viewport, surface);
                true
            }
            // The move was applied optimistically
            PendingMutation::Move { .. } => false,
            PendingMutation::Delete { id } => {
                if let Some(visual) = self.visuals.remove(&id) {
                    surface.remove(visual);
                }
                self.markers.remove(&id);
                if self.visited.remove(&id) {
                    self.visited_store.save(&self.map_name, &self.visited);
                }
                true
            }
        }
    }

    fn revert<S: RenderSurface>(
        &mut self,
        mutation: PendingMutation,
        viewport: &Viewport,
        surface: &mut S,
    ) -> bool {
        match mutation {
            // The pending create was never rendered; dropping it is enough
            PendingMutation::Create { .. } => false,
            PendingMutation::Move { id, origin } => {
                self.revert_move(&id, origin, viewport, surface);
                true
            }
            PendingMutation::Delete { id } => {
                // Bring the marker back out of hiding
                if let Some(&visual) = self.visuals.get(&id) {
                    surface.set_opacity(visual, 1.0);
                }
                false
            }
        }
    }

    fn apply_list<S: RenderSurface>(
        &mut self,
        data: &serde_json::Value,
        viewport: &Viewport,
        surface: &mut S,
    ) {
        for (_, visual) in self.visuals.drain() {
            surface.remove(visual);
        }
        self.markers.clear();

        for marker in decode_records(data) {
            self.insert_visual(&marker, surface);
            self.markers.insert(marker.id.clone(), marker);
        }
        self.render(viewport, surface);
    }
}
