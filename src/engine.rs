use crate::core::config::ViewerConfig;
use crate::core::geom::{Point, Rect};
use crate::core::viewport::Viewport;
use crate::input::events::{EventHandled, PointerEvent};
use crate::input::gestures::GestureRecognizer;
use crate::markers::controller::{CredentialPrompt, DropZone, MarkerController, MoveOutcome};
use crate::markers::service::PoiTransport;
use crate::markers::visited::VisitedStore;
use crate::render::RenderSurface;
use crate::tiles::layer::TileLayer;
use crate::tiles::loader::TileFetcher;
use crate::tiles::pyramid::Pyramid;
use crate::tiles::source::PyramidSource;

/// Composition root: wires the transform model, gesture recognizer, tile
/// layer, and marker controller to one render surface.
///
/// The embedder feeds it raw pointer events via [`handle_event`] and calls
/// [`tick`] regularly (each animation frame is plenty) to drain async results.
/// Nothing here blocks.
///
/// [`handle_event`]: ViewerEngine::handle_event
/// [`tick`]: ViewerEngine::tick
pub struct ViewerEngine<S: RenderSurface> {
    config: ViewerConfig,
    viewport: Viewport,
    gestures: GestureRecognizer,
    tiles: TileLayer,
    fetcher: Box<dyn TileFetcher>,
    markers: MarkerController,
    transport: Box<dyn PoiTransport>,
    prompt: Box<dyn CredentialPrompt>,
    surface: S,
    trash_rect: Option<Rect>,
}

impl<S: RenderSurface> ViewerEngine<S> {
    pub fn new(
        config: ViewerConfig,
        fetcher: Box<dyn TileFetcher>,
        transport: Box<dyn PoiTransport>,
        prompt: Box<dyn CredentialPrompt>,
        visited_store: Box<dyn VisitedStore>,
        surface: S,
    ) -> Self {
        let pyramid = Pyramid::new(config.map.map_size(), config.map.tile_size);
        let source = PyramidSource::new(&config.map);
        let tiles = TileLayer::new(pyramid, Box::new(source));
        let markers = MarkerController::new(
            config.markers.clone(),
            config.map.name.clone(),
            visited_store,
        );
        let gestures = GestureRecognizer::with_config(config.gestures.clone());

        Self {
            config,
            viewport: Viewport::new(),
            gestures,
            tiles,
            fetcher,
            markers,
            transport,
            prompt,
            surface,
            trash_rect: None,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn markers(&self) -> &MarkerController {
        &self.markers
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Fits the map to `viewport_size`, kicks off the first tile load, and
    /// requests the marker list.
    pub fn initialize(&mut self, viewport_size: Point) {
        self.viewport
            .fit_and_center(viewport_size, self.config.map.map_size());
        self.tiles
            .update(&self.viewport, self.fetcher.as_ref(), &mut self.surface);
        self.markers.request_list(self.transport.as_ref());
        self.markers.request_types(self.transport.as_ref());
    }

    pub fn set_edit_mode(&mut self, edit_mode: bool) {
        self.markers.set_edit_mode(edit_mode);
        if !edit_mode {
            self.gestures.reset();
        }
    }

    /// Screen rectangle that counts as the trash drop target
    pub fn set_trash_target(&mut self, rect: Option<Rect>) {
        self.trash_rect = rect;
    }

    /// Starts dragging a new marker out of the palette at `position`
    pub fn begin_create_drag(&mut self, pointer_id: u64, position: Point, marker_type: u32) {
        self.markers.begin_create_drag(
            pointer_id,
            position,
            marker_type,
            &self.viewport,
            &mut self.surface,
        );
    }

    /// Routes one raw input event.
    ///
    /// Markers get first refusal: a press on a marker becomes a tap or move
    /// drag and never reaches the gesture recognizer, and moves/releases for
    /// a pointer the marker controller owns stay with it. A view-mode press
    /// that drags past the tap slop is handed back to the recognizer and pans
    /// the map. Everything else drives pan/zoom.
    pub fn handle_event(&mut self, event: &PointerEvent) -> EventHandled {
        match event {
            PointerEvent::Down { pointer_id, position } => {
                if let Some(id) = self.markers.hit_test(*position, &self.viewport) {
                    self.markers.pointer_down_on_marker(
                        *pointer_id,
                        *position,
                        id,
                        &self.viewport,
                        &mut self.surface,
                    );
                    return EventHandled::Handled;
                }
            }
            PointerEvent::Move { pointer_id, position } => {
                if self.markers.owns_pointer(*pointer_id) {
                    match self.markers.pointer_move(
                        *pointer_id,
                        *position,
                        &self.viewport,
                        &mut self.surface,
                    ) {
                        MoveOutcome::Consumed => return EventHandled::Handled,
                        MoveOutcome::TapDissolved { press } => {
                            // Tap slop exceeded: re-press the contact into the
                            // recognizer at the original position, then let
                            // this move pan the full delta since the press
                            self.gestures.handle(
                                &PointerEvent::Down {
                                    pointer_id: *pointer_id,
                                    position: press,
                                },
                                &mut self.viewport,
                            );
                        }
                        MoveOutcome::Unclaimed => {}
                    }
                }
            }
            PointerEvent::Up { pointer_id, position } => {
                if self.markers.owns_pointer(*pointer_id) {
                    let zone = self.classify_drop(*position);
                    self.markers.pointer_up(
                        *pointer_id,
                        zone,
                        &self.viewport,
                        self.transport.as_ref(),
                        &mut self.surface,
                    );
                    return EventHandled::Handled;
                }
            }
            PointerEvent::Cancel { pointer_id } => {
                if self
                    .markers
                    .pointer_cancel(*pointer_id, &self.viewport, &mut self.surface)
                {
                    return EventHandled::Handled;
                }
            }
            PointerEvent::Resize { size } => {
                self.viewport
                    .fit_and_center(*size, self.config.map.map_size());
                self.after_transform_change();
                return EventHandled::Handled;
            }
            PointerEvent::Wheel { .. } => {}
        }

        let handled = self.gestures.handle(event, &mut self.viewport);
        if handled == EventHandled::Handled {
            self.after_transform_change();
        }
        handled
    }

    /// Drains async work: completed tile fetches and marker service outcomes
    pub fn tick(&mut self) {
        self.tiles
            .process_results(&self.viewport, self.fetcher.as_ref(), &mut self.surface);
        self.markers.poll_service(
            &self.viewport,
            self.transport.as_ref(),
            self.prompt.as_mut(),
            &mut self.surface,
        );
    }

    /// Releases every visual and persists marker state
    pub fn teardown(&mut self) {
        self.tiles.clear(&mut self.surface);
        self.markers.teardown(&mut self.surface);
        self.gestures.reset();
    }

    fn classify_drop(&self, position: Point) -> DropZone {
        if let Some(trash) = &self.trash_rect {
            if trash.contains(&position) {
                return DropZone::Trash;
            }
        }
        let viewport_rect = Rect::from_size(
            Point::new(0.0, 0.0),
            self.viewport.viewport_size.x,
            self.viewport.viewport_size.y,
        );
        if viewport_rect.contains(&position) {
            DropZone::Map(position)
        } else {
            DropZone::Outside
        }
    }

    fn after_transform_change(&mut self) {
        self.tiles
            .update(&self.viewport, self.fetcher.as_ref(), &mut self.surface);
        self.markers.render(&self.viewport, &mut self.surface);
    }
}
