use serde::{Deserialize, Serialize};

/// Represents a point in screen or map pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Midpoint between two points
    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// An axis-aligned rectangle in screen or map pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_size(origin: Point, width: f64, height: f64) -> Self {
        Self::new(origin, Point::new(origin.x + width, origin.y + height))
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min.x && point.x < self.max.x && point.y >= self.min.y && point.y < self.max.y
    }

    /// Clamps the rectangle into `bounds`, collapsing to an edge if disjoint
    pub fn clamp_to(&self, bounds: &Rect) -> Rect {
        Rect::new(
            Point::new(
                self.min.x.clamp(bounds.min.x, bounds.max.x),
                self.min.y.clamp(bounds.min.y, bounds.max.y),
            ),
            Point::new(
                self.max.x.clamp(bounds.min.x, bounds.max.x),
                self.max.y.clamp(bounds.min.y, bounds.max.y),
            ),
        )
    }
}

/// Identifies one tile within the quad pyramid.
///
/// `zoom` 0 is the smallest level (the whole map fits one tile); zoom grows
/// toward full resolution. `x`, `y` are zero-based grid indices at that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_math() {
        let a = Point::new(3.0, 4.0);
        let b = Point::new(0.0, 0.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(a.add(&b), a);
        assert_eq!(a.subtract(&a), b);
        assert_eq!(a.midpoint(&b), Point::new(1.5, 2.0));
    }

    #[test]
    fn test_rect_contains() {
        let rect = Rect::from_size(Point::new(10.0, 10.0), 20.0, 20.0);
        assert!(rect.contains(&Point::new(10.0, 10.0)));
        assert!(rect.contains(&Point::new(29.9, 29.9)));
        assert!(!rect.contains(&Point::new(30.0, 30.0)));
        assert!(!rect.contains(&Point::new(5.0, 15.0)));
    }

    #[test]
    fn test_rect_clamp_to() {
        let bounds = Rect::from_size(Point::new(0.0, 0.0), 100.0, 100.0);
        let rect = Rect::new(Point::new(-50.0, 20.0), Point::new(150.0, 80.0));
        let clamped = rect.clamp_to(&bounds);
        assert_eq!(clamped.min, Point::new(0.0, 20.0));
        assert_eq!(clamped.max, Point::new(100.0, 80.0));
    }
}
