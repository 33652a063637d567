use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::vector::Vec3;

/// Face surface representations carried by the B-rep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Surface {
    Plane(Plane),
}

/// An infinite plane with an orthonormal in-plane frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Plane {
    pub origin: Point3d,
    pub normal: Vec3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
}

impl Plane {
    pub fn new(origin: Point3d, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        let u_axis = normal.any_perpendicular();
        let v_axis = normal.cross(&u_axis);
        Self {
            origin,
            normal,
            u_axis,
            v_axis,
        }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.origin + self.u_axis * u + self.v_axis * v
    }

    pub fn normal_at(&self, _u: f64, _v: f64) -> Vec3 {
        self.normal
    }

    /// Signed distance, positive on the normal side.
    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        (*p - self.origin).dot(&self.normal)
    }
}

impl Surface {
    pub fn normal_at(&self, u: f64, v: f64) -> Vec3 {
        match self {
            Surface::Plane(plane) => plane.normal_at(u, v),
        }
    }

    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        match self {
            Surface::Plane(plane) => plane.distance_to_point(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_frame_is_orthonormal() {
        let plane = Plane::new(Point3d::ORIGIN, Vec3::new(1.0, 1.0, 1.0));
        assert!((plane.normal.length() - 1.0).abs() < 1e-12);
        assert!(plane.u_axis.dot(&plane.normal).abs() < 1e-12);
        assert!(plane.v_axis.dot(&plane.normal).abs() < 1e-12);
        assert!(plane.u_axis.dot(&plane.v_axis).abs() < 1e-12);
    }

    #[test]
    fn test_plane_signed_distance() {
        let plane = Plane::new(Point3d::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 2.0));
        assert!((plane.distance_to_point(&Point3d::new(3.0, 3.0, 3.0)) - 2.0).abs() < 1e-12);
        assert!((plane.distance_to_point(&Point3d::ORIGIN) + 1.0).abs() < 1e-12);
        let p = plane.evaluate(1.0, 2.0);
        assert!(plane.distance_to_point(&p).abs() < 1e-12);
    }
}
