use crate::core::geo::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in world (y up) or display (y down) coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    /// Creates new bounds from two points
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(Point::new(min_x, min_y), Point::new(max_x, max_y))
    }

    /// Smallest bounds holding every point, `None` for an empty slice
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self::new(*first, *first);
        for point in rest {
            bounds.extend(point);
        }
        Some(bounds)
    }

    /// Extends the bounds to include a point
    pub fn extend(&mut self, point: &Point) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
    }

    /// The four corners: (min.x, max.y), (max.x, max.y), (min.x, min.y), (max.x, min.y)
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min.x, self.max.y),
            self.max,
            self.min,
            Point::new(self.max.x, self.min.y),
        ]
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(Point::new(0.0, 0.0), Point::new(0.0, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points() {
        let bounds = Bounds::from_points(&[
            Point::new(3.0, -1.0),
            Point::new(-2.0, 4.0),
            Point::new(0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(bounds, Bounds::from_coords(-2.0, -1.0, 3.0, 4.0));
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_corners_order() {
        let corners = Bounds::from_coords(0.0, 1.0, 10.0, 11.0).corners();
        assert_eq!(corners[0], Point::new(0.0, 11.0));
        assert_eq!(corners[1], Point::new(10.0, 11.0));
        assert_eq!(corners[2], Point::new(0.0, 1.0));
        assert_eq!(corners[3], Point::new(10.0, 1.0));
    }
}
