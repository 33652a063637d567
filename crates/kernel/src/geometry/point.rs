use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

use super::vector::Vec3;

/// A point in 3D Euclidean space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3d {
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        self.distance_squared_to(other).sqrt()
    }

    pub fn distance_squared_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn midpoint(&self, other: &Self) -> Self {
        self.lerp(other, 0.5)
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            x: self.x + t * (other.x - self.x),
            y: self.y + t * (other.y - self.y),
            z: self.z + t * (other.z - self.z),
        }
    }

    pub fn to_vec3(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn from_vec3(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(arr: [f64; 3]) -> Self {
        Self {
            x: arr[0],
            y: arr[1],
            z: arr[2],
        }
    }

    /// True when no coordinate is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Arithmetic mean of a point set. Returns the origin for an empty slice.
    pub fn centroid(points: &[Point3d]) -> Self {
        if points.is_empty() {
            return Self::ORIGIN;
        }
        let sum = points.iter().fold(Vec3::ZERO, |acc, p| acc + p.to_vec3());
        Self::from_vec3(sum / points.len() as f64)
    }

    /// Affine combination `sum(w_i * p_i)`; the caller is responsible for the
    /// weights summing to one.
    pub fn weighted_sum(points: &[Point3d], weights: &[f64]) -> Self {
        let sum = points
            .iter()
            .zip(weights)
            .fold(Vec3::ZERO, |acc, (p, &w)| acc + p.to_vec3() * w);
        Self::from_vec3(sum)
    }
}

impl Add<Vec3> for Point3d {
    type Output = Point3d;
    fn add(self, rhs: Vec3) -> Self::Output {
        Point3d::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3d {
    type Output = Vec3;
    fn sub(self, rhs: Self) -> Self::Output {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Sub<Vec3> for Point3d {
    type Output = Point3d;
    fn sub(self, rhs: Vec3) -> Self::Output {
        Point3d::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point3d::new(1.0, 0.0, 0.0);
        let b = Point3d::new(4.0, 0.0, 0.0);
        assert!((a.distance_to(&b) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_sub_gives_vector() {
        let a = Point3d::new(3.0, 4.0, 5.0);
        let b = Point3d::new(1.0, 1.0, 1.0);
        let v = a - b;
        assert!((v.x - 2.0).abs() < 1e-12);
        assert!((v.y - 3.0).abs() < 1e-12);
        assert!((v.z - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_centroid_of_square() {
        let pts = [
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(2.0, 0.0, 0.0),
            Point3d::new(2.0, 2.0, 0.0),
            Point3d::new(0.0, 2.0, 0.0),
        ];
        let c = Point3d::centroid(&pts);
        assert!(c.distance_to(&Point3d::new(1.0, 1.0, 0.0)) < 1e-12);
        assert_eq!(Point3d::centroid(&[]), Point3d::ORIGIN);
    }

    #[test]
    fn test_weighted_sum_matches_lerp() {
        let a = Point3d::new(0.0, 0.0, 0.0);
        let b = Point3d::new(10.0, 4.0, -2.0);
        let w = Point3d::weighted_sum(&[a, b], &[0.25, 0.75]);
        assert!(w.distance_to(&a.lerp(&b, 0.75)) < 1e-12);
    }

    #[test]
    fn test_non_finite_detected() {
        assert!(Point3d::new(1.0, 2.0, 3.0).is_finite());
        assert!(!Point3d::new(f64::NAN, 0.0, 0.0).is_finite());
        assert!(!Point3d::new(0.0, f64::INFINITY, 0.0).is_finite());
    }
}
