use crate::core::geom::{Point, Rect, TileCoord};

/// Guard against requesting a phantom extra column/row when the visible edge
/// lands exactly on a tile boundary.
const EDGE_EPSILON: f64 = 1e-6;

/// Pure level-of-detail math for a quad tile pyramid over a flat pixel map.
///
/// Level `base_zoom` is full resolution; each lower level halves both
/// dimensions until the whole map fits a single tile at level 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Pyramid {
    map_size: Point,
    tile_size: f64,
    base_zoom: u8,
}

impl Pyramid {
    pub fn new(map_size: Point, tile_size: u32) -> Self {
        let tile_size = tile_size as f64;
        let longest = map_size.x.max(map_size.y);
        let base_zoom = (longest / tile_size).max(1.0).log2().ceil() as u8;
        Self {
            map_size,
            tile_size,
            base_zoom,
        }
    }

    /// Index of the highest-resolution level
    pub fn base_zoom(&self) -> u8 {
        self.base_zoom
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// Picks the level whose native tile resolution best matches `scale`,
    /// keeping the displayed pixel ratio within roughly a factor of √2 of 1:1.
    pub fn select_zoom(&self, scale: f64) -> u8 {
        let ideal = self.base_zoom as f64 + scale.max(f64::MIN_POSITIVE).log2();
        ideal.round().clamp(0.0, self.base_zoom as f64) as u8
    }

    /// Map pixels covered by one native tile pixel at level `zoom`
    pub fn level_scale(&self, zoom: u8) -> f64 {
        2f64.powi(self.base_zoom as i32 - zoom as i32)
    }

    /// Map pixels covered by one whole tile at level `zoom`
    pub fn tile_map_extent(&self, zoom: u8) -> f64 {
        self.tile_size * self.level_scale(zoom)
    }

    /// Tile grid dimensions (columns, rows) at level `zoom`
    pub fn grid_size(&self, zoom: u8) -> (u32, u32) {
        let extent = self.tile_map_extent(zoom);
        (
            (self.map_size.x / extent).ceil().max(1.0) as u32,
            (self.map_size.y / extent).ceil().max(1.0) as u32,
        )
    }

    /// Map-pixel rectangle covered by `coord` (not clamped to map bounds)
    pub fn tile_map_rect(&self, coord: TileCoord) -> Rect {
        let extent = self.tile_map_extent(coord.zoom);
        Rect::from_size(
            Point::new(coord.x as f64 * extent, coord.y as f64 * extent),
            extent,
            extent,
        )
    }

    /// Tile indices covering `visible` (a map-pixel rect) at level `zoom`,
    /// clamped to the level's grid.
    pub fn visible_range(&self, zoom: u8, visible: &Rect) -> TileRange {
        let extent = self.tile_map_extent(zoom);
        let (cols, rows) = self.grid_size(zoom);

        let clamp_index = |v: f64, count: u32| -> u32 {
            (v.floor().max(0.0) as u32).min(count.saturating_sub(1))
        };

        let right = (visible.max.x - EDGE_EPSILON).max(visible.min.x);
        let bottom = (visible.max.y - EDGE_EPSILON).max(visible.min.y);

        TileRange {
            zoom,
            min_x: clamp_index(visible.min.x / extent, cols),
            max_x: clamp_index(right / extent, cols),
            min_y: clamp_index(visible.min.y / extent, rows),
            max_y: clamp_index(bottom / extent, rows),
        }
    }
}

/// Inclusive tile-index range at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn contains(&self, coord: &TileCoord) -> bool {
        coord.zoom == self.zoom
            && coord.x >= self.min_x
            && coord.x <= self.max_x
            && coord.y >= self.min_y
            && coord.y <= self.max_y
    }

    pub fn len(&self) -> usize {
        ((self.max_x - self.min_x + 1) as usize) * ((self.max_y - self.min_y + 1) as usize)
    }

    pub fn is_empty(&self) -> bool {
        false // inclusive ranges always hold at least one tile
    }

    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let zoom = self.zoom;
        (self.min_y..=self.max_y)
            .flat_map(move |y| (self.min_x..=self.max_x).map(move |x| TileCoord::new(zoom, x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_zoom_9400() {
        // ceil(log2(9400 / 256)) = ceil(5.198) = 6
        let pyramid = Pyramid::new(Point::new(9400.0, 9400.0), 256);
        assert_eq!(pyramid.base_zoom(), 6);
    }

    #[test]
    fn test_base_zoom_small_map_is_zero() {
        let pyramid = Pyramid::new(Point::new(200.0, 120.0), 256);
        assert_eq!(pyramid.base_zoom(), 0);
    }

    #[test]
    fn test_select_zoom_at_fit_scale() {
        let pyramid = Pyramid::new(Point::new(9400.0, 9400.0), 256);
        // Small viewport: the whole map fits, fit scale = 192 / 9400
        let fit_scale = 192.0 / 9400.0;
        assert_eq!(pyramid.select_zoom(fit_scale), 0);
    }

    #[test]
    fn test_select_zoom_full_resolution() {
        let pyramid = Pyramid::new(Point::new(9400.0, 9400.0), 256);
        assert_eq!(pyramid.select_zoom(1.0), 6);
        // Over-zoom clamps at the base level
        assert_eq!(pyramid.select_zoom(8.0), 6);
    }

    #[test]
    fn test_level_scale_and_extent() {
        let pyramid = Pyramid::new(Point::new(9400.0, 9400.0), 256);
        assert_eq!(pyramid.level_scale(6), 1.0);
        assert_eq!(pyramid.level_scale(0), 64.0);
        assert_eq!(pyramid.tile_map_extent(0), 256.0 * 64.0);
    }

    #[test]
    fn test_zoomed_out_view_is_single_tile() {
        let pyramid = Pyramid::new(Point::new(9400.0, 9400.0), 256);
        let whole_map = Rect::from_size(Point::new(0.0, 0.0), 9400.0, 9400.0);
        let range = pyramid.visible_range(0, &whole_map);

        assert_eq!(range.len(), 1);
        assert_eq!(range.coords().next(), Some(TileCoord::new(0, 0, 0)));
    }

    #[test]
    fn test_visible_range_clamped_to_grid() {
        let pyramid = Pyramid::new(Point::new(9400.0, 9400.0), 256);
        let (cols, rows) = pyramid.grid_size(6);
        assert_eq!((cols, rows), (37, 37));

        let oversized = Rect::new(Point::new(-500.0, -500.0), Point::new(20000.0, 20000.0));
        let range = pyramid.visible_range(6, &oversized);
        assert_eq!(range.min_x, 0);
        assert_eq!(range.max_x, 36);
        assert_eq!(range.min_y, 0);
        assert_eq!(range.max_y, 36);
    }

    #[test]
    fn test_visible_range_boundary_edge() {
        let pyramid = Pyramid::new(Point::new(9400.0, 9400.0), 256);
        // Right edge exactly on the boundary between columns 0 and 1
        let rect = Rect::from_size(Point::new(0.0, 0.0), 256.0, 256.0);
        let range = pyramid.visible_range(6, &rect);
        assert_eq!(range.max_x, 0);
        assert_eq!(range.max_y, 0);
    }

    #[test]
    fn test_tile_map_rect() {
        let pyramid = Pyramid::new(Point::new(9400.0, 9400.0), 256);
        let rect = pyramid.tile_map_rect(TileCoord::new(5, 2, 3));
        let extent = 256.0 * 2.0;
        assert_eq!(rect.min, Point::new(2.0 * extent, 3.0 * extent));
        assert_eq!(rect.width(), extent);
    }
}
