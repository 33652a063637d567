//! Undercut detection: limit-surface samples whose path along the release
//! direction is blocked by another face of the cage.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::boolean::mesh::ray_triangle;
use crate::error::{MoldError, Result};
use crate::geometry::bounds::BoundingBox;
use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;
use crate::subdivision::{LimitSurfaceEvaluator, TessellationResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UndercutConfig {
    /// Samples per direction per face, at cell midpoints.
    pub samples: usize,
    /// Refinement level of the occluder mesh.
    pub tessellation_level: u32,
    /// A face is reported once more than this fraction of its samples is
    /// blocked.
    pub min_blocked_fraction: f64,
}

impl Default for UndercutConfig {
    fn default() -> Self {
        Self {
            samples: 5,
            tessellation_level: 3,
            min_blocked_fraction: 0.1,
        }
    }
}

/// A face that cannot be pulled along the release direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Undercut {
    pub face: usize,
    /// In `(0, 1]`; higher for faces tilted against the release direction
    /// and for occluders close to the surface.
    pub severity: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct UndercutDetector<'a> {
    evaluator: &'a LimitSurfaceEvaluator,
    config: UndercutConfig,
}

impl<'a> UndercutDetector<'a> {
    pub fn new(evaluator: &'a LimitSurfaceEvaluator) -> Self {
        Self::with_config(evaluator, UndercutConfig::default())
    }

    pub fn with_config(evaluator: &'a LimitSurfaceEvaluator, config: UndercutConfig) -> Self {
        Self { evaluator, config }
    }

    pub fn config(&self) -> &UndercutConfig {
        &self.config
    }

    /// Faces among `faces` with an undercut along `release_direction`,
    /// in input order.
    #[instrument(skip(self, faces), fields(faces = faces.len()))]
    pub fn detect_undercuts(&self, faces: &[usize], release_direction: Vec3) -> Result<Vec<Undercut>> {
        let release = release_direction.normalized().ok_or_else(|| {
            MoldError::InvalidParameter(format!("release direction {release_direction:?} has no length"))
        })?;
        let occluders = self.evaluator.tessellate(self.config.tessellation_level, true)?;

        let mut found = Vec::new();
        for &face in faces {
            let severity = self.face_severity(face, release, &occluders)?;
            if severity > 0.0 {
                found.push(Undercut { face, severity });
            }
        }
        debug!(undercuts = found.len(), "undercut scan complete");
        Ok(found)
    }

    /// Severity of one face against a prebuilt occluder mesh, for a unit
    /// `release`. Each sample scores its backward tilt `-n·d` and, when a
    /// ray along `release` hits another face at distance `t`, `1 / (1 + t)`.
    /// The worst score is scaled by the blocked fraction; below the
    /// configured fraction the face scores zero.
    pub fn face_severity(&self, face: usize, release: Vec3, occluders: &TessellationResult) -> Result<f64> {
        let n = self.config.samples.max(1);
        let lift = 1e-3 * BoundingBox::from_points(&occluders.vertices).diagonal();
        let mut worst = 0.0f64;
        let mut blocked = 0usize;

        for i in 0..n {
            let u = (i as f64 + 0.5) / n as f64;
            for j in 0..n {
                let v = (j as f64 + 0.5) / n as f64;
                let (point, normal) = self.evaluator.evaluate_limit(face, u, v)?;
                let alignment = normal.normalize_or_zero().dot(&release);
                if alignment < 0.0 {
                    worst = worst.max(-alignment);
                }
                if let Some(t) = first_hit(&(point + release * lift), &release, face, occluders) {
                    blocked += 1;
                    worst = worst.max(1.0 / (1.0 + t));
                }
            }
        }

        let fraction = blocked as f64 / (n * n) as f64;
        Ok(if fraction > self.config.min_blocked_fraction {
            worst * fraction
        } else {
            0.0
        })
    }
}

/// Nearest hit of the ray with triangles generated from other faces.
fn first_hit(origin: &Point3d, direction: &Vec3, face: usize, mesh: &TessellationResult) -> Option<f64> {
    mesh.triangles
        .iter()
        .zip(&mesh.face_parents)
        .filter(|&(_, &parent)| parent != face)
        .filter_map(|(tri, _)| ray_triangle(origin, direction, &tri.map(|i| mesh.vertices[i])))
        .filter(|&t| t > 1e-9)
        .reduce(f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subdivision::ControlCage;

    /// Two parallel unit squares facing +Z, one above the other.
    fn shelf() -> LimitSurfaceEvaluator {
        let mut vertices = Vec::new();
        for z in [0.0, 1.0] {
            vertices.extend([
                Point3d::new(0.0, 0.0, z),
                Point3d::new(1.0, 0.0, z),
                Point3d::new(1.0, 1.0, z),
                Point3d::new(0.0, 1.0, z),
            ]);
        }
        LimitSurfaceEvaluator::from_cage(ControlCage::new(vertices, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]])).unwrap()
    }

    #[test]
    fn test_covered_face_is_undercut() {
        let eval = shelf();
        let found = UndercutDetector::new(&eval).detect_undercuts(&[0, 1], Vec3::Z).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].face, 0);
        // Every sample is blocked by the shelf one unit up.
        assert!((found[0].severity - 0.5).abs() < 0.01, "severity {}", found[0].severity);
    }

    #[test]
    fn test_facing_against_release_scores_full() {
        let eval = shelf();
        let found = UndercutDetector::new(&eval).detect_undercuts(&[0, 1], -Vec3::Z).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].face, 1);
        assert!((found[0].severity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unblocked_faces_are_clear() {
        let eval = shelf();
        let found = UndercutDetector::new(&eval)
            .detect_undercuts(&[0, 1], Vec3::new(1.0, 0.0, 0.0))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_zero_direction_rejected() {
        let eval = shelf();
        let err = UndercutDetector::new(&eval).detect_undercuts(&[0], Vec3::ZERO).unwrap_err();
        assert!(matches!(err, MoldError::InvalidParameter(_)));
    }

    #[test]
    fn test_few_blocked_samples_ignored() {
        // A thin strip over the lower square's edge blocks one sample row
        // of five.
        let mut vertices: Vec<Point3d> = vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(1.0, 1.0, 0.0),
            Point3d::new(0.0, 1.0, 0.0),
        ];
        vertices.extend([
            Point3d::new(-0.5, 0.0, 1.0),
            Point3d::new(1.5, 0.0, 1.0),
            Point3d::new(1.5, 0.15, 1.0),
            Point3d::new(-0.5, 0.15, 1.0),
        ]);
        let eval =
            LimitSurfaceEvaluator::from_cage(ControlCage::new(vertices, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]))
                .unwrap();

        let strict = UndercutDetector::with_config(
            &eval,
            UndercutConfig {
                min_blocked_fraction: 0.25,
                ..UndercutConfig::default()
            },
        );
        assert!(strict.detect_undercuts(&[0], Vec3::Z).unwrap().is_empty());

        let found = UndercutDetector::new(&eval).detect_undercuts(&[0], Vec3::Z).unwrap();
        assert_eq!(found.len(), 1);
        // One unit of clearance scores 0.5, over a fifth of the samples.
        assert!((found[0].severity - 0.1).abs() < 0.01, "severity {}", found[0].severity);
    }
}
