use crate::core::geom::TileCoord;
use std::sync::Arc;

/// Handle to one visual element owned by the render surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualId(pub u64);

/// What a visual element represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualKind {
    /// One pyramid tile image
    Tile(TileCoord),
    /// A POI marker icon
    Marker { marker_type: u32 },
    /// A floating drag proxy following the pointer
    Ghost { marker_type: u32 },
}

/// Capability surface for everything the viewer draws.
///
/// The engine talks only to this trait, so the transform, tile, and marker
/// logic is testable without a real display. Positions are screen pixels;
/// implementations own visual lifetime and may ignore ids they no longer know
/// (removal is idempotent).
pub trait RenderSurface {
    /// Creates a new visual element, initially unpositioned
    fn create_visual(&mut self, kind: VisualKind, visible: bool) -> VisualId;

    /// Supplies the (undecoded) image bytes for a tile or icon visual
    fn set_image(&mut self, id: VisualId, data: Arc<Vec<u8>>);

    /// Positions a visual: top-left corner plus size, in screen pixels
    fn place(&mut self, id: VisualId, x: f64, y: f64, width: f64, height: f64);

    fn set_visible(&mut self, id: VisualId, visible: bool);

    fn set_opacity(&mut self, id: VisualId, opacity: f64);

    /// Toggles the "visited" styling on a marker visual
    fn set_visited(&mut self, id: VisualId, visited: bool);

    fn remove(&mut self, id: VisualId);

    /// Surfaces a user-visible (non-fatal) alert
    fn alert(&mut self, message: &str);
}
