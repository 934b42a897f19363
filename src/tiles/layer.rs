use crate::core::geom::TileCoord;
use crate::core::viewport::Viewport;
use crate::render::{RenderSurface, VisualId, VisualKind};
use crate::tiles::cache::TileCache;
use crate::tiles::loader::{TileFetcher, TileRequest};
use crate::tiles::pyramid::{Pyramid, TileRange};
use crate::tiles::source::TileSource;
use fxhash::FxHashMap;
use std::sync::Arc;

/// Extra screen pixels added to each tile's trailing edges so rounding never
/// opens a hairline seam between neighbors.
const SEAM_OVERLAP_PX: f64 = 1.0;

struct LiveTile {
    visual: VisualId,
    failed: bool,
}

struct PendingTile {
    visual: VisualId,
    settled: bool,
    failed: bool,
}

/// An in-progress switch to a different pyramid level. Its visuals exist but
/// stay hidden until every tile has settled, then the whole level appears at
/// once.
struct PendingSwap {
    generation: u64,
    zoom: u8,
    tiles: FxHashMap<TileCoord, PendingTile>,
}

impl PendingSwap {
    fn all_settled(&self) -> bool {
        self.tiles.values().all(|t| t.settled)
    }
}

/// Displays the tile pyramid for the current viewport.
///
/// One zoom level is live at a time. Zoom changes never show a half-loaded
/// level: the new level loads hidden behind the (rescaled) old one and the two
/// are exchanged in a single step. Each swap carries a generation token so
/// fetches that complete after the user has zoomed elsewhere are discarded
/// instead of corrupting the current level.
pub struct TileLayer {
    pyramid: Pyramid,
    source: Box<dyn TileSource>,
    cache: TileCache,
    live_zoom: Option<u8>,
    live: FxHashMap<TileCoord, LiveTile>,
    swap: Option<PendingSwap>,
    generation_counter: u64,
    live_generation: u64,
}

impl TileLayer {
    pub fn new(pyramid: Pyramid, source: Box<dyn TileSource>) -> Self {
        Self {
            pyramid,
            source,
            cache: TileCache::new(),
            live_zoom: None,
            live: FxHashMap::default(),
            swap: None,
            generation_counter: 0,
            live_generation: 0,
        }
    }

    pub fn pyramid(&self) -> &Pyramid {
        &self.pyramid
    }

    pub fn live_zoom(&self) -> Option<u8> {
        self.live_zoom
    }

    pub fn has_pending_swap(&self) -> bool {
        self.swap.is_some()
    }

    fn next_generation(&mut self) -> u64 {
        self.generation_counter += 1;
        self.generation_counter
    }

    /// Reconciles the displayed tiles with the current transform.
    ///
    /// Call after every transform change. Cheap when nothing moved levels:
    /// same-level updates only diff the visible range and reposition.
    pub fn update<S: RenderSurface>(
        &mut self,
        viewport: &Viewport,
        fetcher: &dyn TileFetcher,
        surface: &mut S,
    ) {
        if !viewport.is_initialized() {
            return;
        }

        let zoom = self.pyramid.select_zoom(viewport.scale);
        let range = self.pyramid.visible_range(zoom, &viewport.visible_map_rect());

        match self.live_zoom {
            None => self.populate_live(range, fetcher, surface),
            Some(live) if live == zoom => {
                // Zoomed back before the pending level arrived
                self.abandon_swap(surface);
                self.diff_live(range, fetcher, surface);
            }
            Some(_) => self.ensure_swap(range, fetcher, surface),
        }

        // A swap built entirely from cache hits is ready right away
        if self.swap.as_ref().is_some_and(|s| s.all_settled()) {
            self.commit_swap(viewport, surface);
        }

        self.reposition_all(viewport, surface);
    }

    /// Drains completed fetches and applies them. Returns true when anything
    /// on screen changed (including a swap commit), so the caller knows a
    /// redraw is worthwhile.
    pub fn process_results<S: RenderSurface>(
        &mut self,
        viewport: &Viewport,
        fetcher: &dyn TileFetcher,
        surface: &mut S,
    ) -> bool {
        let mut changed = false;

        for response in fetcher.poll() {
            match response.data {
                Ok(bytes) => {
                    let data = Arc::new(bytes);
                    self.cache.insert(response.coord, Arc::clone(&data));
                    changed |= self.apply_success(response.coord, response.generation, data, surface);
                }
                Err(err) => {
                    log::warn!("tile {:?} failed to load: {err}", response.coord);
                    changed |= self.apply_failure(response.coord, response.generation, surface);
                }
            }
        }

        if self.swap.as_ref().is_some_and(|s| s.all_settled()) {
            self.commit_swap(viewport, surface);
            changed = true;
        }

        changed
    }

    /// Tears down every visual this layer owns
    pub fn clear<S: RenderSurface>(&mut self, surface: &mut S) {
        for (_, tile) in self.live.drain() {
            surface.remove(tile.visual);
        }
        if let Some(swap) = self.swap.take() {
            for tile in swap.tiles.into_values() {
                surface.remove(tile.visual);
            }
        }
        self.live_zoom = None;
    }

    fn populate_live<S: RenderSurface>(
        &mut self,
        range: TileRange,
        fetcher: &dyn TileFetcher,
        surface: &mut S,
    ) {
        self.live_generation = self.next_generation();
        self.live_zoom = Some(range.zoom);
        let mut requests = Vec::new();

        for coord in range.coords() {
            let visual = surface.create_visual(VisualKind::Tile(coord), true);
            if let Some(data) = self.cache.get(&coord) {
                surface.set_image(visual, data);
            } else {
                requests.push(TileRequest {
                    coord,
                    url: self.source.url(coord),
                    generation: self.live_generation,
                });
            }
            self.live.insert(coord, LiveTile { visual, failed: false });
        }

        if !requests.is_empty() {
            fetcher.queue(requests);
        }
    }

    fn diff_live<S: RenderSurface>(
        &mut self,
        range: TileRange,
        fetcher: &dyn TileFetcher,
        surface: &mut S,
    ) {
        let stale: Vec<TileCoord> = self
            .live
            .keys()
            .filter(|coord| !range.contains(coord))
            .copied()
            .collect();
        for coord in stale {
            if let Some(tile) = self.live.remove(&coord) {
                surface.remove(tile.visual);
            }
        }

        let mut requests = Vec::new();
        for coord in range.coords() {
            if self.live.contains_key(&coord) {
                continue;
            }
            let visual = surface.create_visual(VisualKind::Tile(coord), true);
            if let Some(data) = self.cache.get(&coord) {
                surface.set_image(visual, data);
            } else {
                requests.push(TileRequest {
                    coord,
                    url: self.source.url(coord),
                    generation: self.live_generation,
                });
            }
            self.live.insert(coord, LiveTile { visual, failed: false });
        }

        if !requests.is_empty() {
            fetcher.queue(requests);
        }
    }

    fn abandon_swap<S: RenderSurface>(&mut self, surface: &mut S) {
        // The generation token makes late results for it harmless.
        if let Some(old) = self.swap.take() {
            for tile in old.tiles.into_values() {
                surface.remove(tile.visual);
            }
        }
    }

    fn ensure_swap<S: RenderSurface>(
        &mut self,
        range: TileRange,
        fetcher: &dyn TileFetcher,
        surface: &mut S,
    ) {
        // A pan during a pending swap must extend it, not restart it, or a
        // continuous gesture would never let the swap settle.
        if self.swap.as_ref().is_some_and(|s| s.zoom == range.zoom) {
            self.diff_swap(range, fetcher, surface);
            return;
        }
        self.abandon_swap(surface);

        let generation = self.next_generation();
        let mut tiles = FxHashMap::default();
        let mut requests = Vec::new();

        for coord in range.coords() {
            let visual = surface.create_visual(VisualKind::Tile(coord), false);
            let settled = if let Some(data) = self.cache.get(&coord) {
                surface.set_image(visual, data);
                true
            } else {
                requests.push(TileRequest {
                    coord,
                    url: self.source.url(coord),
                    generation,
                });
                false
            };
            tiles.insert(
                coord,
                PendingTile {
                    visual,
                    settled,
                    failed: false,
                },
            );
        }

        self.swap = Some(PendingSwap {
            generation,
            zoom: range.zoom,
            tiles,
        });

        if !requests.is_empty() {
            fetcher.queue(requests);
        }
    }

    fn diff_swap<S: RenderSurface>(
        &mut self,
        range: TileRange,
        fetcher: &dyn TileFetcher,
        surface: &mut S,
    ) {
        let Some(mut swap) = self.swap.take() else {
            return;
        };

        let stale: Vec<TileCoord> = swap
            .tiles
            .keys()
            .filter(|coord| !range.contains(coord))
            .copied()
            .collect();
        for coord in stale {
            if let Some(tile) = swap.tiles.remove(&coord) {
                surface.remove(tile.visual);
            }
        }

        let mut requests = Vec::new();
        for coord in range.coords() {
            if swap.tiles.contains_key(&coord) {
                continue;
            }
            let visual = surface.create_visual(VisualKind::Tile(coord), false);
            let settled = if let Some(data) = self.cache.get(&coord) {
                surface.set_image(visual, data);
                true
            } else {
                requests.push(TileRequest {
                    coord,
                    url: self.source.url(coord),
                    generation: swap.generation,
                });
                false
            };
            swap.tiles.insert(
                coord,
                PendingTile {
                    visual,
                    settled,
                    failed: false,
                },
            );
        }

        self.swap = Some(swap);
        if !requests.is_empty() {
            fetcher.queue(requests);
        }
    }

    fn apply_success<S: RenderSurface>(
        &mut self,
        coord: TileCoord,
        generation: u64,
        data: Arc<Vec<u8>>,
        surface: &mut S,
    ) -> bool {
        if generation == self.live_generation {
            if let Some(tile) = self.live.get_mut(&coord) {
                surface.set_image(tile.visual, data);
                tile.failed = false;
                return true;
            }
        } else if let Some(swap) = self.swap.as_mut() {
            if generation == swap.generation {
                if let Some(tile) = swap.tiles.get_mut(&coord) {
                    surface.set_image(tile.visual, data);
                    tile.settled = true;
                    return true;
                }
            }
        }
        false
    }

    fn apply_failure<S: RenderSurface>(
        &mut self,
        coord: TileCoord,
        generation: u64,
        surface: &mut S,
    ) -> bool {
        if generation == self.live_generation {
            if let Some(tile) = self.live.get_mut(&coord) {
                // Keep the blank visual so the diff does not requeue it every
                // frame.
                tile.failed = true;
                surface.set_visible(tile.visual, false);
                return true;
            }
        } else if let Some(swap) = self.swap.as_mut() {
            if generation == swap.generation {
                if let Some(tile) = swap.tiles.get_mut(&coord) {
                    tile.settled = true;
                    tile.failed = true;
                    return true;
                }
            }
        }
        false
    }

    fn commit_swap<S: RenderSurface>(&mut self, viewport: &Viewport, surface: &mut S) {
        let Some(swap) = self.swap.take() else {
            return;
        };

        for (_, tile) in self.live.drain() {
            surface.remove(tile.visual);
        }

        self.live_zoom = Some(swap.zoom);
        self.live_generation = swap.generation;

        for (coord, tile) in swap.tiles {
            // Failed tiles stay as hidden gaps; keeping them tracked stops
            // the next diff from refetching them.
            surface.set_visible(tile.visual, !tile.failed);
            self.live.insert(
                coord,
                LiveTile {
                    visual: tile.visual,
                    failed: tile.failed,
                },
            );
        }

        self.reposition_all(viewport, surface);
    }

    fn reposition_all<S: RenderSurface>(&self, viewport: &Viewport, surface: &mut S) {
        for (coord, tile) in &self.live {
            self.place_tile(*coord, tile.visual, viewport, surface);
        }
        if let Some(swap) = &self.swap {
            for (coord, tile) in &swap.tiles {
                self.place_tile(*coord, tile.visual, viewport, surface);
            }
        }
    }

    fn place_tile<S: RenderSurface>(
        &self,
        coord: TileCoord,
        visual: VisualId,
        viewport: &Viewport,
        surface: &mut S,
    ) {
        let rect = self.pyramid.tile_map_rect(coord);
        let top_left = viewport.map_to_screen(rect.min);
        let size = rect.width() * viewport.scale + SEAM_OVERLAP_PX;
        surface.place(visual, top_left.x, top_left.y, size, size);
    }
}
