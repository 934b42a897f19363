use crate::core::config::MapConfig;
use crate::core::geom::TileCoord;

/// Resolves tile coordinates to fetchable URLs
pub trait TileSource: Send + Sync {
    fn url(&self, coord: TileCoord) -> String;
}

/// Standard pyramid layout: `{base}/tiles/{map}/{zoom}/{x}_{y}.{ext}`
#[derive(Debug, Clone)]
pub struct PyramidSource {
    base_url: String,
    map_name: String,
    extension: String,
}

impl PyramidSource {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            base_url: config.tile_base_url.trim_end_matches('/').to_string(),
            map_name: config.name.clone(),
            extension: config.tile_ext.clone(),
        }
    }
}

impl TileSource for PyramidSource {
    fn url(&self, coord: TileCoord) -> String {
        format!(
            "{}/tiles/{}/{}/{}_{}.{}",
            self.base_url, self.map_name, coord.zoom, coord.x, coord.y, self.extension
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_layout() {
        let mut config = MapConfig::new("atlas", 9400.0, 9400.0);
        config.tile_base_url = "https://tiles.example.com/".to_string();
        let source = PyramidSource::new(&config);

        assert_eq!(
            source.url(TileCoord::new(3, 5, 7)),
            "https://tiles.example.com/tiles/atlas/3/5_7.jpg"
        );
    }
}
