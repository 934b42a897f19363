//! Headless demo: drives the viewer engine against a real tile/POI backend
//! without any display, logging what a renderer would have been told to draw.
//!
//! Usage: `cargo run --example headless -- http://localhost:8000`

use std::sync::Arc;
use std::time::Duration;

use tilescope::{
    CredentialPrompt, HttpPoiService, HttpTileLoader, MapConfig, MemoryVisitedStore, Point,
    PointerEvent, RenderSurface, SpawnedTransport, ViewerConfig, ViewerEngine, VisualId,
    VisualKind,
};

/// Render surface that only counts and logs
#[derive(Default)]
struct ConsoleSurface {
    next_id: u64,
    live: u64,
    images_set: u64,
}

impl RenderSurface for ConsoleSurface {
    fn create_visual(&mut self, kind: VisualKind, visible: bool) -> VisualId {
        self.next_id += 1;
        self.live += 1;
        log::debug!("create {:?} visible={visible} -> #{}", kind, self.next_id);
        VisualId(self.next_id)
    }

    fn set_image(&mut self, id: VisualId, data: Arc<Vec<u8>>) {
        self.images_set += 1;
        log::debug!("image  #{} ({} bytes)", id.0, data.len());
    }

    fn place(&mut self, _id: VisualId, _x: f64, _y: f64, _width: f64, _height: f64) {}

    fn set_visible(&mut self, id: VisualId, visible: bool) {
        log::debug!("show   #{} = {visible}", id.0);
    }

    fn set_opacity(&mut self, _id: VisualId, _opacity: f64) {}

    fn set_visited(&mut self, _id: VisualId, _visited: bool) {}

    fn remove(&mut self, id: VisualId) {
        self.live = self.live.saturating_sub(1);
        log::debug!("remove #{}", id.0);
    }

    fn alert(&mut self, message: &str) {
        log::warn!("alert: {message}");
    }
}

struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn request_token(&mut self) -> Option<String> {
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8000".to_string());

    let mut map = MapConfig::new("demo", 9400.0, 9400.0);
    map.tile_base_url = base_url.clone();
    let config = ViewerConfig::new(map);

    let fetcher = HttpTileLoader::new(config.loader.clone());
    let transport = SpawnedTransport::new(Arc::new(HttpPoiService::new(format!(
        "{base_url}/api/poi"
    ))));

    let mut engine = ViewerEngine::new(
        config,
        Box::new(fetcher),
        Box::new(transport),
        Box::new(NoPrompt),
        Box::new(MemoryVisitedStore::new()),
        ConsoleSurface::default(),
    );

    engine.initialize(Point::new(1280.0, 800.0));
    log::info!("fitted at scale {:.4}", engine.viewport().scale);

    // Zoom toward the center, then drag a bit
    engine.handle_event(&PointerEvent::Wheel {
        delta_y: -250.0,
        position: Point::new(640.0, 400.0),
    });
    engine.handle_event(&PointerEvent::Down {
        pointer_id: 1,
        position: Point::new(640.0, 400.0),
    });
    engine.handle_event(&PointerEvent::Move {
        pointer_id: 1,
        position: Point::new(540.0, 350.0),
    });
    engine.handle_event(&PointerEvent::Up {
        pointer_id: 1,
        position: Point::new(540.0, 350.0),
    });

    // Let async tile fetches and the marker list land
    for _ in 0..100 {
        engine.tick();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    println!(
        "visuals alive: {}, tile images delivered: {}, markers: {}",
        engine.surface().live,
        engine.surface().images_set,
        engine.markers().marker_count()
    );

    engine.teardown();
    Ok(())
}
