use crate::core::geom::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Scale factor bounds relative to the fit scale
const MIN_SCALE_FACTOR: f64 = 0.4;
const MAX_SCALE_FACTOR: f64 = 32.0;
const MIN_SCALE_FLOOR: f64 = 0.05;

/// Manages the current view of the map: scale, translation, and dimensions.
///
/// This is the transform model: it owns the affine mapping between screen
/// pixels and map pixels and performs no I/O. All mutations clamp rather than
/// error, and callers are responsible for re-rendering afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Current scale factor (screen pixels per map pixel)
    pub scale: f64,
    /// Screen position of the map's top-left corner
    pub translate: Point,
    /// Full-resolution map dimensions in pixels
    pub map_size: Point,
    /// Viewport dimensions in pixels
    pub viewport_size: Point,
    /// Scale at which the whole map exactly fits the viewport
    pub fit_scale: f64,
    /// The minimum allowed scale
    pub min_scale: f64,
    /// The maximum allowed scale
    pub max_scale: f64,
    /// Set by the first `fit_and_center`; later calls only clamp
    initialized: bool,
}

impl Viewport {
    pub fn new() -> Self {
        Self {
            scale: 1.0,
            translate: Point::default(),
            map_size: Point::default(),
            viewport_size: Point::default(),
            fit_scale: 1.0,
            min_scale: MIN_SCALE_FLOOR,
            max_scale: 1.0,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// First-time initialization: fit the map into the viewport and center it.
    ///
    /// Once initialized, subsequent calls only update the viewport size and
    /// clamp the translation; they never re-fit, so a window resize does not
    /// throw away the user's pan/zoom state.
    pub fn fit_and_center(&mut self, viewport_size: Point, map_size: Point) {
        if self.initialized {
            self.viewport_size = viewport_size;
            self.clamp_translation();
            return;
        }

        if map_size.x <= 0.0 || map_size.y <= 0.0 || viewport_size.x <= 0.0 || viewport_size.y <= 0.0
        {
            return;
        }

        self.map_size = map_size;
        self.viewport_size = viewport_size;
        self.fit_scale = (viewport_size.x / map_size.x).min(viewport_size.y / map_size.y);
        self.scale = self.fit_scale;
        self.min_scale = (self.fit_scale * MIN_SCALE_FACTOR).max(MIN_SCALE_FLOOR);
        self.max_scale = self.fit_scale * MAX_SCALE_FACTOR;
        self.translate = Point::new(
            (viewport_size.x - map_size.x * self.scale) / 2.0,
            (viewport_size.y - map_size.y * self.scale) / 2.0,
        );
        self.initialized = true;
    }

    /// Zooms so the map-space point under `anchor` stays under `anchor`.
    ///
    /// Both wheel and pinch zoom route through here, so anchoring is exact
    /// regardless of trigger. `target_scale` is clamped into
    /// `[min_scale, max_scale]` first, then the translation is clamped to the
    /// viewport bounds (which may move the anchor when the map edge is hit).
    pub fn set_scale_around(&mut self, target_scale: f64, anchor: Point) {
        let anchor_map = self.screen_to_map(anchor);
        self.scale = target_scale.clamp(self.min_scale, self.max_scale);
        self.translate = anchor.subtract(&anchor_map.multiply(self.scale));
        self.clamp_translation();
    }

    /// Pans by a screen-pixel delta, then clamps.
    pub fn pan_by(&mut self, delta: Point) {
        self.translate = self.translate.add(&delta);
        self.clamp_translation();
    }

    /// Sets the translation absolutely, then clamps.
    ///
    /// Pan gestures use this with `origin + total delta` so repeated move
    /// events cannot accumulate drift.
    pub fn set_translation(&mut self, translate: Point) {
        self.translate = translate;
        self.clamp_translation();
    }

    /// Per axis: if the scaled map extent fits the viewport, center it;
    /// otherwise clamp so the map can never be panned fully off-screen.
    pub fn clamp_translation(&mut self) {
        self.translate.x =
            Self::clamp_axis(self.translate.x, self.map_size.x * self.scale, self.viewport_size.x);
        self.translate.y =
            Self::clamp_axis(self.translate.y, self.map_size.y * self.scale, self.viewport_size.y);
    }

    fn clamp_axis(translate: f64, scaled_extent: f64, viewport_extent: f64) -> f64 {
        if scaled_extent <= viewport_extent {
            (viewport_extent - scaled_extent) / 2.0
        } else {
            translate.clamp(viewport_extent - scaled_extent, 0.0)
        }
    }

    /// Converts screen pixel coordinates to map pixel coordinates
    pub fn screen_to_map(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.translate.x) / self.scale,
            (screen.y - self.translate.y) / self.scale,
        )
    }

    /// Converts map pixel coordinates to screen pixel coordinates
    pub fn map_to_screen(&self, map: Point) -> Point {
        Point::new(
            self.translate.x + map.x * self.scale,
            self.translate.y + map.y * self.scale,
        )
    }

    /// Map pixels → normalized `[0,1]` fractions of the map dimensions.
    ///
    /// Normalized coordinates are the persisted marker format: they stay valid
    /// if the pyramid is regenerated at a different resolution.
    pub fn normalize(&self, map: Point) -> Point {
        Point::new(map.x / self.map_size.x, map.y / self.map_size.y)
    }

    /// Normalized `[0,1]` fractions → map pixels
    pub fn denormalize(&self, norm: Point) -> Point {
        Point::new(norm.x * self.map_size.x, norm.y * self.map_size.y)
    }

    /// Position of the current scale within `[min_scale, max_scale]`, in `[0,1]`
    pub fn zoom_progress(&self) -> f64 {
        let span = self.max_scale - self.min_scale;
        if span <= 0.0 {
            return 0.0;
        }
        ((self.scale - self.min_scale) / span).clamp(0.0, 1.0)
    }

    /// The visible portion of the map in map pixels, clamped to map bounds
    pub fn visible_map_rect(&self) -> Rect {
        let top_left = self.screen_to_map(Point::new(0.0, 0.0));
        let bottom_right = self.screen_to_map(self.viewport_size);
        let map_bounds = Rect::new(Point::new(0.0, 0.0), self.map_size);
        Rect::new(top_left, bottom_right).clamp_to(&map_bounds)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}
