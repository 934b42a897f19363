use crate::core::geom::Point;
use crate::input::gestures::GestureConfig;
use crate::tiles::loader::TileLoaderConfig;
use serde::{Deserialize, Serialize};

/// Describes one tiled map: dimensions, tile geometry, and resource naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Map identifier, used in tile URLs and as the POI catalog key
    pub name: String,
    /// Full-resolution map width in pixels
    pub map_width: f64,
    /// Full-resolution map height in pixels
    pub map_height: f64,
    /// Tile edge length in pixels (tiles are square)
    pub tile_size: u32,
    /// Tile image file extension
    pub tile_ext: String,
    /// Base URL prefix for tile requests (may be empty for same-origin)
    pub tile_base_url: String,
}

impl MapConfig {
    pub fn new(name: impl Into<String>, map_width: f64, map_height: f64) -> Self {
        Self {
            name: name.into(),
            map_width,
            map_height,
            tile_size: 256,
            tile_ext: "jpg".to_string(),
            tile_base_url: String::new(),
        }
    }

    pub fn map_size(&self) -> Point {
        Point::new(self.map_width, self.map_height)
    }
}

/// Marker appearance and interaction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// On-screen marker size at minimum zoom, in pixels
    pub min_size_px: f64,
    /// On-screen marker size at maximum zoom, in pixels
    pub max_size_px: f64,
    /// Movement below this distance still counts as a tap, in pixels
    pub tap_slop: f64,
    /// Maximum tap duration in milliseconds
    pub tap_timeout_ms: u64,
    /// How many times a rejected write re-prompts for credentials
    pub auth_retry_limit: u32,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            min_size_px: 24.0,
            max_size_px: 64.0,
            tap_slop: 6.0,
            tap_timeout_ms: 400,
            auth_retry_limit: 3,
        }
    }
}

/// Top-level configuration for a viewer instance
#[derive(Debug, Clone, Default)]
pub struct ViewerConfig {
    pub map: MapConfig,
    pub gestures: GestureConfig,
    pub loader: TileLoaderConfig,
    pub markers: MarkerConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self::new("map", 0.0, 0.0)
    }
}

impl ViewerConfig {
    pub fn new(map: MapConfig) -> Self {
        Self {
            map,
            gestures: GestureConfig::default(),
            loader: TileLoaderConfig::default(),
            markers: MarkerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_config_defaults() {
        let config = MapConfig::new("atlas", 9400.0, 9400.0);
        assert_eq!(config.tile_size, 256);
        assert_eq!(config.tile_ext, "jpg");
        assert_eq!(config.map_size(), Point::new(9400.0, 9400.0));
    }
}
