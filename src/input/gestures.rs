use crate::{
    core::geom::Point,
    core::viewport::Viewport,
    input::events::{EventHandled, PointerEvent, PointerId},
};
use serde::{Deserialize, Serialize};

/// Configuration for gesture recognition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureConfig {
    /// Exponent coefficient for wheel zoom: `scale * exp(-delta_y * rate)`
    pub wheel_zoom_rate: f64,
    /// Pinch sessions below this start distance are ignored (degenerate pair)
    pub pinch_min_distance: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            wheel_zoom_rate: 0.01,
            pinch_min_distance: 8.0,
        }
    }
}

/// One live pointer contact, kept in registration order
#[derive(Debug, Clone, Copy)]
struct PointerSample {
    id: PointerId,
    position: Point,
}

/// Single-pointer pan in progress.
///
/// `origin` is the translation at session start; the pan applies
/// `origin + (current - start)` absolutely, so move events cannot accumulate
/// drift.
#[derive(Debug, Clone, Copy)]
struct PanSession {
    pointer_id: PointerId,
    start: Point,
    origin: Point,
}

/// Two-pointer pinch in progress.
///
/// Scale is ratio-based from the start distance, never incremental, and the
/// midpoint's own displacement is applied as a pan each move.
#[derive(Debug, Clone, Copy)]
struct PinchSession {
    pointer_ids: (PointerId, PointerId),
    start_distance: f64,
    start_scale: f64,
    prev_midpoint: Point,
}

/// Recognizes pan, pinch-zoom, and wheel-zoom over the live pointer set and
/// drives the transform model directly.
///
/// State machine: Idle → (first pointer) Panning → (second pointer) Pinching.
/// Dropping back to one pointer re-seeds the pan from the survivor's current
/// position so nothing jumps; the pinch pair is recreated whenever the two
/// earliest-registered pointers change.
pub struct GestureRecognizer {
    pub enabled: bool,
    config: GestureConfig,
    pointers: Vec<PointerSample>,
    pan: Option<PanSession>,
    pinch: Option<PinchSession>,
}

impl GestureRecognizer {
    pub fn new() -> Self {
        Self::with_config(GestureConfig::default())
    }

    pub fn with_config(config: GestureConfig) -> Self {
        Self {
            enabled: true,
            config,
            pointers: Vec::new(),
            pan: None,
            pinch: None,
        }
    }

    /// Processes one input event against the viewport.
    ///
    /// Returns `Handled` when the event belongs to an active gesture (the
    /// embedder should prevent the default platform behavior).
    pub fn handle(&mut self, event: &PointerEvent, viewport: &mut Viewport) -> EventHandled {
        if !self.enabled {
            return EventHandled::NotHandled;
        }

        match event {
            PointerEvent::Down { pointer_id, position } => {
                self.pointer_down(*pointer_id, *position, viewport)
            }
            PointerEvent::Move { pointer_id, position } => {
                self.pointer_move(*pointer_id, *position, viewport)
            }
            PointerEvent::Up { pointer_id, .. } | PointerEvent::Cancel { pointer_id } => {
                self.pointer_up(*pointer_id, viewport)
            }
            PointerEvent::Wheel { delta_y, position } => {
                self.wheel(*delta_y, *position, viewport);
                EventHandled::Handled
            }
            PointerEvent::Resize { .. } => EventHandled::NotHandled,
        }
    }

    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }

    /// Resets all gesture state
    pub fn reset(&mut self) {
        self.pointers.clear();
        self.pan = None;
        self.pinch = None;
    }

    fn pointer_down(
        &mut self,
        id: PointerId,
        position: Point,
        viewport: &mut Viewport,
    ) -> EventHandled {
        if let Some(sample) = self.pointers.iter_mut().find(|p| p.id == id) {
            // Duplicate down for a known pointer: refresh position only
            sample.position = position;
        } else {
            self.pointers.push(PointerSample { id, position });
        }
        self.reseed_sessions(viewport);
        EventHandled::Handled
    }

    fn pointer_move(
        &mut self,
        id: PointerId,
        position: Point,
        viewport: &mut Viewport,
    ) -> EventHandled {
        let Some(sample) = self.pointers.iter_mut().find(|p| p.id == id) else {
            // Unknown pointer (capture handed elsewhere); not ours
            return EventHandled::NotHandled;
        };
        sample.position = position;

        if let Some(pinch) = self.pinch {
            if pinch.pointer_ids.0 == id || pinch.pointer_ids.1 == id {
                self.apply_pinch(viewport);
            }
            return EventHandled::Handled;
        }

        if let Some(pan) = self.pan {
            if pan.pointer_id == id {
                let delta = position.subtract(&pan.start);
                viewport.set_translation(pan.origin.add(&delta));
            }
        }
        EventHandled::Handled
    }

    fn pointer_up(&mut self, id: PointerId, viewport: &mut Viewport) -> EventHandled {
        let before = self.pointers.len();
        self.pointers.retain(|p| p.id != id);
        if self.pointers.len() == before {
            return EventHandled::NotHandled;
        }
        self.reseed_sessions(viewport);
        EventHandled::Handled
    }

    fn wheel(&mut self, delta_y: f64, position: Point, viewport: &mut Viewport) {
        // Exponential mapping gives perceptually uniform zoom speed
        // independent of platform wheel-delta units.
        let target = viewport.scale * (-delta_y * self.config.wheel_zoom_rate).exp();
        viewport.set_scale_around(target, position);
    }

    /// Rebuilds pan/pinch sessions after the pointer set changed.
    ///
    /// Any transition through exactly one pointer replaces the pan session
    /// (seeded from the survivor's current position), and any change to the
    /// two earliest-registered pointers replaces the pinch session.
    fn reseed_sessions(&mut self, viewport: &Viewport) {
        match self.pointers.len() {
            0 => {
                self.pan = None;
                self.pinch = None;
            }
            1 => {
                let sample = self.pointers[0];
                self.pinch = None;
                self.pan = Some(PanSession {
                    pointer_id: sample.id,
                    start: sample.position,
                    origin: viewport.translate,
                });
            }
            _ => {
                let (a, b) = (self.pointers[0], self.pointers[1]);
                let pair = (a.id, b.id);
                let stale = self.pinch.map(|p| p.pointer_ids != pair).unwrap_or(true);
                if stale {
                    self.pan = None;
                    self.pinch = Some(PinchSession {
                        pointer_ids: pair,
                        start_distance: a.position.distance_to(&b.position),
                        start_scale: viewport.scale,
                        prev_midpoint: a.position.midpoint(&b.position),
                    });
                }
            }
        }
    }

    fn apply_pinch(&mut self, viewport: &mut Viewport) {
        let Some(pinch) = self.pinch.as_mut() else {
            return;
        };
        let (Some(a), Some(b)) = (
            self.pointers.iter().find(|p| p.id == pinch.pointer_ids.0),
            self.pointers.iter().find(|p| p.id == pinch.pointer_ids.1),
        ) else {
            return;
        };

        let distance = a.position.distance_to(&b.position);
        let midpoint = a.position.midpoint(&b.position);

        if pinch.start_distance >= self.config.pinch_min_distance {
            let target = pinch.start_scale * (distance / pinch.start_distance);
            viewport.set_scale_around(target, midpoint);
        }
        // The midpoint's own displacement pans the map (pinch simultaneously
        // zooms and pans).
        viewport.pan_by(midpoint.subtract(&pinch.prev_midpoint));
        pinch.prev_midpoint = midpoint;
    }
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        Self::new()
    }
}
