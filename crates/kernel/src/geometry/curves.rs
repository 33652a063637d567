use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::vector::Vec3;

/// Edge curve representations carried by the B-rep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Curve {
    Line(Line3d),
}

/// A line through `origin` with unit `direction`; edges use it with an arc-length
/// parameter range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Line3d {
    pub origin: Point3d,
    pub direction: Vec3,
}

impl Line3d {
    pub fn from_points(a: Point3d, b: Point3d) -> Self {
        Self {
            origin: a,
            direction: (b - a).normalize_or_zero(),
        }
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.origin + self.direction * t
    }
}

impl Curve {
    pub fn evaluate(&self, t: f64) -> Point3d {
        match self {
            Curve::Line(line) => line.evaluate(t),
        }
    }
}
