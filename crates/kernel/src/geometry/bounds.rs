use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::vector::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3d,
    pub max: Point3d,
}

impl BoundingBox {
    pub fn new(min: Point3d, max: Point3d) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Point3d::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3d::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_points(points: &[Point3d]) -> Self {
        let mut bb = Self::empty();
        for p in points {
            bb.expand_to_include(p);
        }
        bb
    }

    pub fn expand_to_include(&mut self, p: &Point3d) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut bb = *self;
        bb.expand_to_include(&other.min);
        bb.expand_to_include(&other.max);
        bb
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: &Point3d) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn center(&self) -> Point3d {
        self.min.midpoint(&self.max)
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Length of the box diagonal; zero for an empty box.
    pub fn diagonal(&self) -> f64 {
        if self.is_valid() { self.size().length() } else { 0.0 }
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: Point3d::new(self.min.x - margin, self.min.y - margin, self.min.z - margin),
            max: Point3d::new(self.max.x + margin, self.max.y + margin, self.max.z + margin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box_is_invalid() {
        let bb = BoundingBox::empty();
        assert!(!bb.is_valid());
        assert_eq!(bb.diagonal(), 0.0);
    }

    #[test]
    fn test_from_points_and_diagonal() {
        let bb = BoundingBox::from_points(&[Point3d::new(0.0, 0.0, 0.0), Point3d::new(3.0, 4.0, 0.0)]);
        assert!((bb.diagonal() - 5.0).abs() < 1e-12);
        assert!(bb.contains_point(&Point3d::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn test_intersects_touching_boxes() {
        let a = BoundingBox::new(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let b = BoundingBox::new(Point3d::new(1.0, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0));
        let c = BoundingBox::new(Point3d::new(1.5, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.expanded(0.6).intersects(&c));
    }
}
