use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use tilescope::markers::service::{PoiOutcome, PoiRequest, PoiTransport, RequestId, ServiceError};
use tilescope::tiles::loader::{TileFetcher, TileRequest, TileResponse};
use tilescope::{
    CredentialPrompt, EventHandled, MapConfig, MemoryVisitedStore, Point, PointerEvent, PoiId,
    Rect, RenderSurface, TileCoord, ViewerConfig, ViewerEngine, VisualId, VisualKind,
};

#[derive(Debug, Clone)]
struct VisualState {
    kind: VisualKind,
    visible: bool,
    rect: Option<(f64, f64, f64, f64)>,
    has_image: bool,
    opacity: f64,
    visited: bool,
}

/// Render surface that just records what the engine asked for
#[derive(Default)]
struct RecordingSurface {
    next_id: u64,
    visuals: HashMap<VisualId, VisualState>,
    alerts: Vec<String>,
}

impl RecordingSurface {
    fn tile_states(&self, zoom: u8) -> Vec<(TileCoord, VisualState)> {
        self.visuals
            .values()
            .filter_map(|state| match state.kind {
                VisualKind::Tile(coord) if coord.zoom == zoom => Some((coord, state.clone())),
                _ => None,
            })
            .collect()
    }

    fn visible_tile_count(&self, zoom: u8) -> usize {
        self.tile_states(zoom).iter().filter(|(_, s)| s.visible).count()
    }

    fn marker_states(&self) -> Vec<VisualState> {
        self.visuals
            .values()
            .filter(|state| matches!(state.kind, VisualKind::Marker { .. }))
            .cloned()
            .collect()
    }

    fn ghost_count(&self) -> usize {
        self.visuals
            .values()
            .filter(|state| matches!(state.kind, VisualKind::Ghost { .. }))
            .count()
    }
}

impl RenderSurface for RecordingSurface {
    fn create_visual(&mut self, kind: VisualKind, visible: bool) -> VisualId {
        self.next_id += 1;
        let id = VisualId(self.next_id);
        self.visuals.insert(
            id,
            VisualState {
                kind,
                visible,
                rect: None,
                has_image: false,
                opacity: 1.0,
                visited: false,
            },
        );
        id
    }

    fn set_image(&mut self, id: VisualId, _data: Arc<Vec<u8>>) {
        if let Some(state) = self.visuals.get_mut(&id) {
            state.has_image = true;
        }
    }

    fn place(&mut self, id: VisualId, x: f64, y: f64, width: f64, height: f64) {
        if let Some(state) = self.visuals.get_mut(&id) {
            state.rect = Some((x, y, width, height));
        }
    }

    fn set_visible(&mut self, id: VisualId, visible: bool) {
        if let Some(state) = self.visuals.get_mut(&id) {
            state.visible = visible;
        }
    }

    fn set_opacity(&mut self, id: VisualId, opacity: f64) {
        if let Some(state) = self.visuals.get_mut(&id) {
            state.opacity = opacity;
        }
    }

    fn set_visited(&mut self, id: VisualId, visited: bool) {
        if let Some(state) = self.visuals.get_mut(&id) {
            state.visited = visited;
        }
    }

    fn remove(&mut self, id: VisualId) {
        self.visuals.remove(&id);
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }
}

#[derive(Default)]
struct FetcherState {
    requests: Vec<TileRequest>,
    responses: Vec<TileResponse>,
}

/// Tile fetcher the test scripts by hand
#[derive(Clone, Default)]
struct StubFetcher(Rc<RefCell<FetcherState>>);

impl StubFetcher {
    fn queued(&self) -> Vec<TileRequest> {
        self.0.borrow().requests.clone()
    }

    /// Answers every queued request with dummy bytes
    fn respond_all(&self) {
        let mut state = self.0.borrow_mut();
        let requests = std::mem::take(&mut state.requests);
        for request in requests {
            state.responses.push(TileResponse {
                coord: request.coord,
                generation: request.generation,
                data: Ok(vec![0xAB]),
            });
        }
    }

    fn drop_queued(&self) -> Vec<TileRequest> {
        std::mem::take(&mut self.0.borrow_mut().requests)
    }

    fn respond(&self, request: TileRequest) {
        self.0.borrow_mut().responses.push(TileResponse {
            coord: request.coord,
            generation: request.generation,
            data: Ok(vec![0xAB]),
        });
    }

    /// Answers one request with a load error
    fn fail(&self, request: TileRequest) {
        self.0.borrow_mut().responses.push(TileResponse {
            coord: request.coord,
            generation: request.generation,
            data: Err("503 Service Unavailable".into()),
        });
    }
}

impl TileFetcher for StubFetcher {
    fn queue(&self, requests: Vec<TileRequest>) {
        self.0.borrow_mut().requests.extend(requests);
    }

    fn poll(&self) -> Vec<TileResponse> {
        std::mem::take(&mut self.0.borrow_mut().responses)
    }
}

#[derive(Default)]
struct TransportState {
    submitted: Vec<(RequestId, PoiRequest)>,
    outcomes: Vec<PoiOutcome>,
    next_id: u64,
}

/// Marker transport the test scripts by hand
#[derive(Clone, Default)]
struct StubTransport(Rc<RefCell<TransportState>>);

impl StubTransport {
    fn submitted(&self) -> Vec<(RequestId, PoiRequest)> {
        self.0.borrow().submitted.clone()
    }

    fn deliver(&self, request_id: RequestId, result: Result<serde_json::Value, ServiceError>) {
        self.0
            .borrow_mut()
            .outcomes
            .push(PoiOutcome { request_id, result });
    }
}

impl PoiTransport for StubTransport {
    fn submit(&self, request: PoiRequest) -> RequestId {
        let mut state = self.0.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.submitted.push((id, request));
        id
    }

    fn poll(&self) -> Vec<PoiOutcome> {
        std::mem::take(&mut self.0.borrow_mut().outcomes)
    }
}

struct StubPrompt {
    token: Option<String>,
    calls: Rc<RefCell<usize>>,
}

impl CredentialPrompt for StubPrompt {
    fn request_token(&mut self) -> Option<String> {
        *self.calls.borrow_mut() += 1;
        self.token.clone()
    }
}

struct Harness {
    engine: ViewerEngine<RecordingSurface>,
    fetcher: StubFetcher,
    transport: StubTransport,
    prompt_calls: Rc<RefCell<usize>>,
}

/// 1000x1000 map in a 500x500 viewport: fit scale 0.5, pyramid base zoom 2,
/// fitted view selects zoom 1 (a 2x2 grid).
fn harness(token: Option<&str>) -> Harness {
    let config = ViewerConfig::new(MapConfig::new("atlas", 1000.0, 1000.0));
    let fetcher = StubFetcher::default();
    let transport = StubTransport::default();
    let prompt_calls = Rc::new(RefCell::new(0));
    let prompt = StubPrompt {
        token: token.map(str::to_string),
        calls: Rc::clone(&prompt_calls),
    };

    let engine = ViewerEngine::new(
        config,
        Box::new(fetcher.clone()),
        Box::new(transport.clone()),
        Box::new(prompt),
        Box::new(MemoryVisitedStore::new()),
        RecordingSurface::default(),
    );

    Harness {
        engine,
        fetcher,
        transport,
        prompt_calls,
    }
}

fn initialized(token: Option<&str>) -> Harness {
    let mut h = harness(token);
    h.engine.initialize(Point::new(500.0, 500.0));
    h.fetcher.respond_all();
    h.engine.tick();
    h
}

const MARKER_ID: &str = "00112233445566778899aabbccddeeff";

/// Installs one marker at normalized (0.5, 0.5) through the list flow
fn with_center_marker(token: Option<&str>) -> (Harness, PoiId) {
    let mut h = initialized(token);
    let list_id = h.transport.submitted()[0].0;
    h.transport.deliver(
        list_id,
        Ok(json!([{ "id": MARKER_ID, "type": 2, "x": 0.5, "y": 0.5 }])),
    );
    h.engine.tick();
    (h, PoiId::try_from(MARKER_ID.to_string()).unwrap())
}

#[test]
fn test_initialize_loads_fitted_level_and_requests_markers() {
    let mut h = harness(None);
    h.engine.initialize(Point::new(500.0, 500.0));

    assert!(h.engine.viewport().is_initialized());
    assert!((h.engine.viewport().scale - 0.5).abs() < 1e-12);

    // Zoom 1 covers the map in a 2x2 grid, all visible from the start
    let queued = h.fetcher.queued();
    assert_eq!(queued.len(), 4);
    assert!(queued.iter().all(|r| r.coord.zoom == 1));
    assert_eq!(h.engine.surface().visible_tile_count(1), 4);

    // URL layout comes from the map config
    assert!(queued.iter().any(|r| r.url.ends_with("/tiles/atlas/1/0_0.jpg")));

    // The marker list and type catalog requests went out immediately
    let submitted = h.transport.submitted();
    assert_eq!(submitted.len(), 2);
}

#[test]
fn test_type_catalog_is_applied() {
    let mut h = initialized(None);
    let types_id = h.transport.submitted()[1].0;
    h.transport.deliver(
        types_id,
        Ok(json!([
            { "id": 1, "name": "camp" },
            { "id": 2, "name": "vista" },
            { "bogus": true }
        ])),
    );
    h.engine.tick();

    let types = h.engine.markers().marker_types();
    assert_eq!(types.len(), 2);
    assert_eq!(types[1].name, "vista");
}

#[test]
fn test_wheel_zoom_is_handled_and_anchored() {
    let mut h = initialized(None);
    let anchor = Point::new(250.0, 250.0);
    let before = h.engine.viewport().screen_to_map(anchor);

    let handled = h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: -100.0,
        position: anchor,
    });
    assert_eq!(handled, EventHandled::Handled);
    assert!(h.engine.viewport().scale > 0.5);

    let after = h.engine.viewport().screen_to_map(anchor);
    assert!(before.distance_to(&after) < 1e-9);
}

#[test]
fn test_level_swap_stays_hidden_until_complete() {
    let mut h = initialized(None);

    // Zoom deep enough to move from level 1 to level 2
    h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: -300.0,
        position: Point::new(250.0, 250.0),
    });

    let queued = h.fetcher.queued();
    assert!(!queued.is_empty());
    assert!(queued.iter().all(|r| r.coord.zoom == 2));

    // New level exists but is invisible; the old level still shows
    assert_eq!(h.engine.surface().visible_tile_count(2), 0);
    assert_eq!(h.engine.surface().visible_tile_count(1), 4);

    h.fetcher.respond_all();
    h.engine.tick();

    // Atomic exchange: the whole new level appears, the old one is gone
    assert!(h.engine.surface().visible_tile_count(2) > 0);
    assert_eq!(h.engine.surface().tile_states(1).len(), 0);
}

#[test]
fn test_failed_tile_settles_swap_and_stays_hidden() {
    let mut h = initialized(None);

    h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: -300.0,
        position: Point::new(250.0, 250.0),
    });

    let mut queued = h.fetcher.drop_queued();
    assert!(queued.len() > 1);
    let failed = queued.remove(0);
    let failed_coord = failed.coord;
    h.fetcher.fail(failed);
    for request in queued {
        h.fetcher.respond(request);
    }
    h.engine.tick();

    // The failure settles its slot, so the swap still commits
    assert_eq!(h.engine.surface().tile_states(1).len(), 0);
    let states = h.engine.surface().tile_states(2);
    assert!(!states.is_empty());

    // Exactly the failed tile is a hidden gap
    for (coord, state) in &states {
        assert_eq!(state.visible, *coord != failed_coord);
    }

    // And a later pass over the same level never refetches it
    h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: -5.0,
        position: Point::new(250.0, 250.0),
    });
    assert!(h.fetcher.queued().iter().all(|r| r.coord != failed_coord));
}

#[test]
fn test_stale_generation_results_are_discarded() {
    let mut h = initialized(None);

    h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: -300.0,
        position: Point::new(250.0, 250.0),
    });
    let abandoned = h.fetcher.drop_queued();
    assert!(!abandoned.is_empty());

    // Zoom back out before anything arrives; the pending swap is dropped
    h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: 300.0,
        position: Point::new(250.0, 250.0),
    });
    assert_eq!(h.engine.surface().tile_states(2).len(), 0);

    // Late results for the dead generation change nothing
    for request in abandoned {
        h.fetcher.respond(request);
    }
    h.engine.tick();

    assert_eq!(h.engine.surface().tile_states(2).len(), 0);
    assert_eq!(h.engine.surface().visible_tile_count(1), 4);
}

#[test]
fn test_pan_diffs_the_live_level() {
    let mut h = initialized(None);

    // Zoom into level 2 and settle there
    h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: -300.0,
        position: Point::new(250.0, 250.0),
    });
    h.fetcher.respond_all();
    h.engine.tick();
    let before: Vec<TileCoord> = h
        .engine
        .surface()
        .tile_states(2)
        .iter()
        .map(|(c, _)| *c)
        .collect();

    // Captured pointers keep reporting outside the viewport, so one long
    // drag can cross several tile columns
    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 1,
        position: Point::new(400.0, 400.0),
    });
    h.engine.handle_event(&PointerEvent::Move {
        pointer_id: 1,
        position: Point::new(-2000.0, -2000.0),
    });
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 1,
        position: Point::new(-2000.0, -2000.0),
    });

    let after: Vec<TileCoord> = h
        .engine
        .surface()
        .tile_states(2)
        .iter()
        .map(|(c, _)| *c)
        .collect();

    // Same level, different coverage; no hidden swap happened
    assert!(after.iter().all(|c| c.zoom == 2));
    assert_ne!(before, after);
}

#[test]
fn test_resize_preserves_zoom_state() {
    let mut h = initialized(None);
    h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: -200.0,
        position: Point::new(250.0, 250.0),
    });
    let scale = h.engine.viewport().scale;

    h.engine.handle_event(&PointerEvent::Resize {
        size: Point::new(400.0, 300.0),
    });

    assert_eq!(h.engine.viewport().scale, scale);
    assert_eq!(h.engine.viewport().viewport_size, Point::new(400.0, 300.0));
}

#[test]
fn test_marker_list_is_applied_and_rendered() {
    let (h, _) = with_center_marker(None);

    let markers = h.engine.surface().marker_states();
    assert_eq!(markers.len(), 1);
    assert_eq!(h.engine.markers().marker_count(), 1);

    // Centered on screen at normalized (0.5, 0.5)
    let (x, y, w, _) = markers[0].rect.unwrap();
    assert!((x + w / 2.0 - 250.0).abs() < 1e-9);
    assert!((y + w / 2.0 - 250.0).abs() < 1e-9);
}

#[test]
fn test_tap_toggles_visited_in_view_mode() {
    let (mut h, id) = with_center_marker(None);

    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 1,
        position: Point::new(250.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 1,
        position: Point::new(251.0, 250.0),
    });

    assert!(h.engine.markers().is_visited(&id));
    assert!(h.engine.surface().marker_states()[0].visited);

    // A second tap toggles it back off
    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 1,
        position: Point::new(250.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 1,
        position: Point::new(250.0, 250.0),
    });
    assert!(!h.engine.markers().is_visited(&id));
}

#[test]
fn test_drag_past_slop_is_not_a_tap() {
    let (mut h, id) = with_center_marker(None);

    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 1,
        position: Point::new(250.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Move {
        pointer_id: 1,
        position: Point::new(290.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 1,
        position: Point::new(290.0, 250.0),
    });

    assert!(!h.engine.markers().is_visited(&id));
}

#[test]
fn test_drag_past_slop_pans_the_map() {
    let (mut h, id) = with_center_marker(None);

    // Zoom in so the map has pan slack in every direction
    h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: -300.0,
        position: Point::new(250.0, 250.0),
    });
    let before = h.engine.viewport().translate;

    // Press the marker, then drag well past the tap slop
    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 1,
        position: Point::new(250.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Move {
        pointer_id: 1,
        position: Point::new(290.0, 250.0),
    });

    // The contact became a pan, applying the full delta since the press
    let after = h.engine.viewport().translate;
    assert!((after.x - before.x - 40.0).abs() < 1e-9);
    assert_eq!(after.y, before.y);

    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 1,
        position: Point::new(290.0, 250.0),
    });
    assert!(!h.engine.markers().is_visited(&id));
}

#[test]
fn test_create_drag_renders_on_confirmation() {
    let mut h = initialized(None);
    h.engine.set_edit_mode(true);

    h.engine.begin_create_drag(9, Point::new(100.0, 100.0), 3);
    assert_eq!(h.engine.surface().ghost_count(), 1);

    h.engine.handle_event(&PointerEvent::Move {
        pointer_id: 9,
        position: Point::new(250.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 9,
        position: Point::new(250.0, 250.0),
    });

    // Ghost gone; the request is out but nothing renders yet
    assert_eq!(h.engine.surface().ghost_count(), 0);
    assert_eq!(h.engine.markers().marker_count(), 0);

    let (request_id, create) = h.transport.submitted().last().unwrap().clone();
    assert_eq!(create.payload["type"], 3);
    assert!((create.payload["x"].as_f64().unwrap() - 0.5).abs() < 1e-9);
    assert!((create.payload["y"].as_f64().unwrap() - 0.5).abs() < 1e-9);

    // Its id was minted client-side before the round trip
    let id = PoiId::try_from(create.payload["id"].as_str().unwrap().to_string()).unwrap();

    h.transport.deliver(request_id, Ok(json!({})));
    h.engine.tick();

    assert_eq!(h.engine.markers().marker_count(), 1);
    assert!(h.engine.markers().marker(&id).is_some());

    // Rendered centered on the drop point
    let markers = h.engine.surface().marker_states();
    let (x, y, w, _) = markers[0].rect.unwrap();
    assert!((x + w / 2.0 - 250.0).abs() < 1e-9);
    assert!((y + w / 2.0 - 250.0).abs() < 1e-9);
}

#[test]
fn test_rejected_create_is_dropped_with_alert() {
    let mut h = initialized(None);
    h.engine.set_edit_mode(true);

    h.engine.begin_create_drag(9, Point::new(250.0, 250.0), 1);
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 9,
        position: Point::new(250.0, 250.0),
    });
    assert_eq!(h.engine.markers().marker_count(), 0);

    let request_id = h.transport.submitted().last().unwrap().0;
    h.transport.deliver(
        request_id,
        Err(ServiceError::Rejected {
            status: 400,
            message: "nope".to_string(),
        }),
    );
    h.engine.tick();

    assert_eq!(h.engine.markers().marker_count(), 0);
    assert_eq!(h.engine.surface().marker_states().len(), 0);
    assert!(!h.engine.surface().alerts.is_empty());
}

#[test]
fn test_auth_retry_resubmits_with_token() {
    let mut h = initialized(Some("secret"));
    h.engine.set_edit_mode(true);

    h.engine.begin_create_drag(9, Point::new(250.0, 250.0), 1);
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 9,
        position: Point::new(250.0, 250.0),
    });

    let (request_id, first) = h.transport.submitted().last().unwrap().clone();
    assert_eq!(first.token, None);

    h.transport.deliver(request_id, Err(ServiceError::AuthRequired));
    h.engine.tick();

    assert_eq!(*h.prompt_calls.borrow(), 1);
    let (retry_id, retry) = h.transport.submitted().last().unwrap().clone();
    assert_ne!(retry_id, request_id);
    assert_eq!(retry.token.as_deref(), Some("secret"));

    // Confirmation keeps the optimistic marker, no alert raised
    h.transport.deliver(retry_id, Ok(json!({})));
    h.engine.tick();
    assert_eq!(h.engine.markers().marker_count(), 1);
    assert!(h.engine.surface().alerts.is_empty());
}

#[test]
fn test_auth_retry_without_token_reverts() {
    let mut h = initialized(None);
    h.engine.set_edit_mode(true);

    h.engine.begin_create_drag(9, Point::new(250.0, 250.0), 1);
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 9,
        position: Point::new(250.0, 250.0),
    });

    let request_id = h.transport.submitted().last().unwrap().0;
    h.transport.deliver(request_id, Err(ServiceError::AuthRequired));
    h.engine.tick();

    assert_eq!(h.engine.markers().marker_count(), 0);
    assert!(!h.engine.surface().alerts.is_empty());
}

#[test]
fn test_move_drag_updates_and_failure_reverts() {
    let (mut h, id) = with_center_marker(None);
    h.engine.set_edit_mode(true);

    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 4,
        position: Point::new(250.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Move {
        pointer_id: 4,
        position: Point::new(300.0, 300.0),
    });
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 4,
        position: Point::new(300.0, 300.0),
    });

    // Optimistic move to normalized (0.6, 0.6)
    let marker = h.engine.markers().marker(&id).unwrap();
    assert!((marker.x - 0.6).abs() < 1e-9);
    assert!((marker.y - 0.6).abs() < 1e-9);

    let (request_id, update) = h.transport.submitted().last().unwrap().clone();
    assert!((update.payload["x"].as_f64().unwrap() - 0.6).abs() < 1e-9);

    h.transport.deliver(
        request_id,
        Err(ServiceError::Rejected {
            status: 500,
            message: "server".to_string(),
        }),
    );
    h.engine.tick();

    let marker = h.engine.markers().marker(&id).unwrap();
    assert!((marker.x - 0.5).abs() < 1e-9);
    assert!(!h.engine.surface().alerts.is_empty());
}

#[test]
fn test_move_drop_outside_viewport_reverts() {
    let (mut h, id) = with_center_marker(None);
    h.engine.set_edit_mode(true);
    let submitted_before = h.transport.submitted().len();

    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 4,
        position: Point::new(250.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 4,
        position: Point::new(900.0, 900.0),
    });

    let marker = h.engine.markers().marker(&id).unwrap();
    assert!((marker.x - 0.5).abs() < 1e-9);
    // Nothing was sent to the backend
    assert_eq!(h.transport.submitted().len(), submitted_before);
}

#[test]
fn test_trash_drop_deletes_after_confirmation() {
    let (mut h, id) = with_center_marker(None);
    h.engine.set_edit_mode(true);
    h.engine
        .set_trash_target(Some(Rect::from_size(Point::new(440.0, 440.0), 60.0, 60.0)));

    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 4,
        position: Point::new(250.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Move {
        pointer_id: 4,
        position: Point::new(470.0, 470.0),
    });
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 4,
        position: Point::new(470.0, 470.0),
    });

    // Deletion is not optimistic: the marker survives until confirmed
    assert!(h.engine.markers().marker(&id).is_some());

    let (request_id, delete) = h.transport.submitted().last().unwrap().clone();
    assert_eq!(delete.payload["id"], MARKER_ID);
    h.transport.deliver(request_id, Ok(json!({})));
    h.engine.tick();

    assert!(h.engine.markers().marker(&id).is_none());
    assert_eq!(h.engine.surface().marker_states().len(), 0);
}

#[test]
fn test_cancel_reverts_active_drag() {
    let (mut h, id) = with_center_marker(None);
    h.engine.set_edit_mode(true);

    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 4,
        position: Point::new(250.0, 250.0),
    });
    h.engine.handle_event(&PointerEvent::Move {
        pointer_id: 4,
        position: Point::new(300.0, 300.0),
    });
    h.engine.handle_event(&PointerEvent::Cancel { pointer_id: 4 });

    assert_eq!(h.engine.surface().ghost_count(), 0);
    let marker = h.engine.markers().marker(&id).unwrap();
    assert!((marker.x - 0.5).abs() < 1e-9);
}

#[test]
fn test_malformed_marker_rows_are_dropped() {
    let mut h = initialized(None);
    let list_id = h.transport.submitted()[0].0;
    h.transport.deliver(
        list_id,
        Ok(json!([
            { "id": MARKER_ID, "type": 1, "x": 0.25, "y": 0.75 },
            { "id": "garbage", "type": 1, "x": 0.5, "y": 0.5 },
            { "id": "00112233445566778899aabbccddee00", "type": 1, "x": 2.0, "y": 0.5 }
        ])),
    );
    h.engine.tick();

    assert_eq!(h.engine.markers().marker_count(), 1);
}

#[test]
fn test_create_drop_off_map_is_silently_discarded() {
    let mut h = initialized(None);
    h.engine.set_edit_mode(true);
    let submitted_before = h.transport.submitted().len();

    // The map occupies the whole 500x500 viewport; drop in the viewport but
    // past the map edge via a point that normalizes outside [0,1]
    h.engine.handle_event(&PointerEvent::Wheel {
        delta_y: 60.0,
        position: Point::new(250.0, 250.0),
    });
    assert!(h.engine.viewport().scale < 0.5);

    h.engine.begin_create_drag(9, Point::new(250.0, 250.0), 1);
    h.engine.handle_event(&PointerEvent::Up {
        pointer_id: 9,
        position: Point::new(495.0, 250.0),
    });

    assert_eq!(h.transport.submitted().len(), submitted_before);
    assert_eq!(h.engine.markers().marker_count(), 0);
    assert!(h.engine.surface().alerts.is_empty());
}

#[test]
fn test_second_drag_reverts_the_first() {
    let (mut h, id) = with_center_marker(None);
    h.engine.set_edit_mode(true);

    // Start a move drag; the source marker hides behind the ghost
    h.engine.handle_event(&PointerEvent::Down {
        pointer_id: 4,
        position: Point::new(250.0, 250.0),
    });
    assert_eq!(h.engine.surface().ghost_count(), 1);
    assert_eq!(h.engine.surface().marker_states()[0].opacity, 0.0);

    // Starting a create drag forcibly reverts it; never two ghosts
    h.engine.begin_create_drag(9, Point::new(100.0, 100.0), 2);
    assert_eq!(h.engine.surface().ghost_count(), 1);
    assert_eq!(h.engine.surface().marker_states()[0].opacity, 1.0);

    let marker = h.engine.markers().marker(&id).unwrap();
    assert!((marker.x - 0.5).abs() < 1e-9);
}

#[test]
fn test_teardown_releases_everything() {
    let (mut h, _) = with_center_marker(None);
    assert!(!h.engine.surface().visuals.is_empty());

    h.engine.teardown();
    assert!(h.engine.surface().visuals.is_empty());
}
