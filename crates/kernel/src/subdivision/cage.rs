use serde::{Deserialize, Serialize};

use crate::error::{MoldError, Result};
use crate::geometry::point::Point3d;

/// A crease tag on a cage edge. Sharpness is normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Crease {
    pub v0: usize,
    pub v1: usize,
    pub sharpness: f64,
}

/// Polygonal control cage of a Catmull-Clark surface.
///
/// Faces are variable-arity index lists into `vertices`. Creases are carried
/// and validated, but refinement does not apply them yet: every edge is
/// treated as smooth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlCage {
    pub vertices: Vec<Point3d>,
    pub faces: Vec<Vec<usize>>,
    #[serde(default)]
    pub creases: Vec<Crease>,
}

impl ControlCage {
    pub fn new(vertices: Vec<Point3d>, faces: Vec<Vec<usize>>) -> Self {
        Self {
            vertices,
            faces,
            creases: Vec::new(),
        }
    }

    pub fn with_creases(mut self, creases: Vec<Crease>) -> Self {
        self.creases = creases;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check the cage is usable as evaluator input.
    pub fn validate(&self) -> Result<()> {
        if self.vertices.is_empty() {
            return Err(MoldError::InvalidInput("control cage has no vertices".into()));
        }
        if self.faces.is_empty() {
            return Err(MoldError::InvalidInput("control cage has no faces".into()));
        }
        if let Some(index) = self.vertices.iter().position(|p| !p.is_finite()) {
            return Err(MoldError::InvalidInput(format!("vertex {index} has a non-finite coordinate")));
        }
        for (face_index, face) in self.faces.iter().enumerate() {
            if face.is_empty() {
                return Err(MoldError::InvalidInput(format!("face {face_index} has no vertices")));
            }
            if face.len() < 3 {
                return Err(MoldError::InvalidInput(format!(
                    "face {face_index} has {} vertices, at least 3 are required",
                    face.len()
                )));
            }
            if let Some(&bad) = face.iter().find(|&&v| v >= self.vertices.len()) {
                return Err(MoldError::InvalidInput(format!(
                    "face {face_index} references vertex {bad}, cage has {} vertices",
                    self.vertices.len()
                )));
            }
            for k in 0..face.len() {
                if face[k] == face[(k + 1) % face.len()] {
                    return Err(MoldError::InvalidInput(format!(
                        "face {face_index} repeats vertex {} on consecutive corners",
                        face[k]
                    )));
                }
            }
        }
        for crease in &self.creases {
            if crease.v0 >= self.vertices.len() || crease.v1 >= self.vertices.len() || crease.v0 == crease.v1 {
                return Err(MoldError::InvalidInput(format!(
                    "crease ({}, {}) does not name a valid vertex pair",
                    crease.v0, crease.v1
                )));
            }
            if !(0.0..=1.0).contains(&crease.sharpness) {
                return Err(MoldError::InvalidInput(format!(
                    "crease ({}, {}) sharpness {} outside [0, 1]",
                    crease.v0, crease.v1, crease.sharpness
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> ControlCage {
        ControlCage::new(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(2.0, 0.0, 0.0),
                Point3d::new(2.0, 2.0, 0.0),
                Point3d::new(0.0, 2.0, 0.0),
            ],
            vec![vec![0, 1, 2, 3]],
        )
    }

    #[test]
    fn test_valid_quad_cage() {
        assert!(quad().validate().is_ok());
    }

    #[test]
    fn test_empty_cage_rejected() {
        let err = ControlCage::default().validate().unwrap_err();
        assert!(matches!(err, MoldError::InvalidInput(_)));

        let mut no_faces = quad();
        no_faces.faces.clear();
        assert!(matches!(no_faces.validate(), Err(MoldError::InvalidInput(_))));
    }

    #[test]
    fn test_bad_faces_rejected() {
        let mut cage = quad();
        cage.faces.push(vec![]);
        assert!(matches!(cage.validate(), Err(MoldError::InvalidInput(msg)) if msg.contains("no vertices")));

        let mut cage = quad();
        cage.faces[0][2] = 9;
        assert!(matches!(cage.validate(), Err(MoldError::InvalidInput(msg)) if msg.contains("references vertex 9")));
    }

    #[test]
    fn test_crease_sharpness_range() {
        let cage = quad().with_creases(vec![Crease {
            v0: 0,
            v1: 1,
            sharpness: 1.5,
        }]);
        assert!(cage.validate().is_err());

        let cage = quad().with_creases(vec![Crease {
            v0: 0,
            v1: 1,
            sharpness: 0.5,
        }]);
        assert!(cage.validate().is_ok());
    }
}
