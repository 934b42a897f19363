//! # tilescope
//!
//! A viewport engine for very large raster maps served as a quad pyramid of
//! pre-sliced square tiles.
//!
//! The crate keeps a consistent geometric mapping between screen pixels, map
//! pixels, and normalized `[0,1]` coordinates while reacting to asynchronous
//! tile loads and concurrent multi-pointer input. Rendering is abstracted
//! behind [`render::RenderSurface`], so the whole engine runs headless.

pub mod core;
pub mod engine;
pub mod input;
pub mod markers;
pub mod render;
pub mod tiles;

// Re-export public API
pub use crate::core::{
    config::{MapConfig, MarkerConfig, ViewerConfig},
    geom::{Point, Rect, TileCoord},
    viewport::Viewport,
};

pub use input::{
    events::{EventHandled, PointerEvent, PointerId},
    gestures::{GestureConfig, GestureRecognizer},
};

pub use tiles::{
    cache::TileCache,
    layer::TileLayer,
    loader::{HttpTileLoader, TileFetcher, TileLoaderConfig},
    pyramid::Pyramid,
    source::{PyramidSource, TileSource},
};

pub use markers::{
    controller::{CredentialPrompt, DropZone, MarkerController, MoveOutcome},
    poi::{MarkerTypeInfo, PoiId, PoiMarker},
    service::{HttpPoiService, PoiService, PoiTransport, SpawnedTransport},
    visited::{JsonFileStore, MemoryVisitedStore, VisitedStore},
};

pub use engine::ViewerEngine;

pub use render::{RenderSurface, VisualId, VisualKind};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tile load failed: {0}")]
    TileLoad(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Identifier error: {0}")]
    Id(String),
}

/// Error type alias for convenience
pub type Error = ViewerError;
