use crate::core::geom::Point;
use serde::{Deserialize, Serialize};

/// Identifies one pointer contact (mouse, touch, or pen)
pub type PointerId = u64;

/// Raw input events delivered to the viewer by the embedder.
///
/// The embedder is expected to acquire pointer capture for each active pointer
/// so move/up keep arriving after the pointer leaves the element; the viewer
/// tolerates events for unknown pointer ids, so capture-release failures are
/// non-fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    /// A new pointer contact
    Down { pointer_id: PointerId, position: Point },
    /// Pointer movement
    Move { pointer_id: PointerId, position: Point },
    /// Pointer lifted
    Up { pointer_id: PointerId, position: Point },
    /// Pointer contact aborted by the platform
    Cancel { pointer_id: PointerId },
    /// Scroll wheel; `delta_y` is in platform wheel units
    Wheel { delta_y: f64, position: Point },
    /// Viewport/window resize
    Resize { size: Point },
}

impl PointerEvent {
    /// Gets the position associated with this event, if any
    pub fn position(&self) -> Option<Point> {
        match self {
            PointerEvent::Down { position, .. } => Some(*position),
            PointerEvent::Move { position, .. } => Some(*position),
            PointerEvent::Up { position, .. } => Some(*position),
            PointerEvent::Wheel { position, .. } => Some(*position),
            PointerEvent::Cancel { .. } | PointerEvent::Resize { .. } => None,
        }
    }

    pub fn pointer_id(&self) -> Option<PointerId> {
        match self {
            PointerEvent::Down { pointer_id, .. }
            | PointerEvent::Move { pointer_id, .. }
            | PointerEvent::Up { pointer_id, .. }
            | PointerEvent::Cancel { pointer_id } => Some(*pointer_id),
            PointerEvent::Wheel { .. } | PointerEvent::Resize { .. } => None,
        }
    }
}

/// Whether an event was consumed by the viewer.
///
/// `Handled` means the embedder should suppress the default platform behavior
/// (browser scroll/zoom) for this event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventHandled {
    Handled,
    NotHandled,
}
