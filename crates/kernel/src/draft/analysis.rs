//! Draft-angle measurement for limit surfaces and fitted patches.

use serde::{Deserialize, Serialize};

use crate::error::{MoldError, Result};
use crate::geometry::nurbs::RationalSurfacePatch;
use crate::geometry::vector::Vec3;
use crate::subdivision::LimitSurfaceEvaluator;

/// Draft of one base face measured at its parametric centre, in degrees.
/// Positive values face along the release direction, negative values are
/// undercuts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceDraft {
    pub face: usize,
    pub angle_degrees: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct DraftAnalysis {
    release: Vec3,
}

impl DraftAnalysis {
    pub fn new(release_direction: Vec3) -> Result<Self> {
        let release = release_direction.normalized().ok_or_else(|| {
            MoldError::InvalidParameter(format!("release direction {release_direction:?} has no length"))
        })?;
        Ok(Self { release })
    }

    /// `90° - angle(normal, release)`: 90 for a face pointing along the
    /// release direction, 0 for a wall parallel to it.
    pub fn draft_angle(&self, normal: Vec3) -> f64 {
        90.0 - normal.angle_to(&self.release).to_degrees()
    }

    /// Draft of each requested base face from the exact limit normal at
    /// (0.5, 0.5).
    pub fn face_drafts(&self, evaluator: &LimitSurfaceEvaluator, faces: &[usize]) -> Result<Vec<FaceDraft>> {
        faces
            .iter()
            .map(|&face| {
                let (_, normal) = evaluator.evaluate_limit(face, 0.5, 0.5)?;
                Ok(FaceDraft {
                    face,
                    angle_degrees: self.draft_angle(normal),
                })
            })
            .collect()
    }

    /// Smallest draft over a `samples x samples` grid of the patch, skipping
    /// singular points. `None` when no sample has a normal.
    pub fn patch_min_draft(&self, patch: &RationalSurfacePatch, samples: usize) -> Option<f64> {
        let n = samples.max(2);
        let step = 1.0 / (n - 1) as f64;
        (0..n)
            .flat_map(|i| (0..n).map(move |j| (i as f64 * step, j as f64 * step)))
            .filter_map(|(u, v)| patch.normal(u, v))
            .map(|normal| self.draft_angle(normal))
            .reduce(f64::min)
    }
}
