//! Polygonal regions on the map plane.

use serde::{Deserialize, Serialize};

use super::Point2D;

/// A closed polygon described by its vertices in order.
///
/// The closing edge from the last vertex back to the first is implicit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolyRegion {
    /// Polygon vertices in the map frame.
    pub points: Vec<Point2D>,
}

impl PolyRegion {
    /// Create a region from its vertices.
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    /// Axis-aligned rectangle from two opposite corners.
    pub fn rectangle(min: Point2D, max: Point2D) -> Self {
        Self::new(vec![
            Point2D::new(min.x, min.y),
            Point2D::new(max.x, min.y),
            Point2D::new(max.x, max.y),
            Point2D::new(min.x, max.y),
        ])
    }

    /// A polygon needs at least three vertices to enclose an area.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 3
    }

    /// Enclosed area in square meters (shoelace formula).
    pub fn area(&self) -> f32 {
        if !self.is_valid() {
            return 0.0;
        }
        let n = self.points.len();
        let twice_area: f32 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice_area.abs() * 0.5
    }

    /// Point-in-polygon test (even-odd rule).
    pub fn contains(&self, point: &Point2D) -> bool {
        if !self.is_valid() {
            return false;
        }
        let n = self.points.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let pi = self.points[i];
            let pj = self.points[j];
            if (pi.y > point.y) != (pj.y > point.y)
                && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}
