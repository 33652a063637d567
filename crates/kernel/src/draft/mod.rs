//! Draft (taper) of fitted patches for mold release.
//!
//! Control points are pushed radially away from the release axis in
//! proportion to their height above the separation plane, so the surface
//! leans by the draft angle on both sides of the plane. Points on the plane
//! stay where they are, which keeps the parting seam fixed.

pub mod analysis;
pub mod constraints;
pub mod undercut;

use tracing::{info, instrument};

use crate::error::{MoldError, Result};
use crate::geometry::nurbs::RationalSurfacePatch;
use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;

pub use analysis::{DraftAnalysis, FaceDraft};
pub use constraints::{
    ConstraintLevel, ConstraintReport, ConstraintValidator, ConstraintViolation, MIN_DRAFT_ANGLE,
    RECOMMENDED_DRAFT_ANGLE,
};
pub use undercut::{Undercut, UndercutConfig, UndercutDetector};

/// Largest draft angle accepted, in degrees.
pub const MAX_DRAFT_ANGLE: f64 = 45.0;

/// Heights and radial offsets below this are treated as on the seam.
const SEAM_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct DraftTransformer;

impl DraftTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Tilt `patch` by `angle_degrees` relative to `release_direction`.
    ///
    /// The separation plane passes through the first point of
    /// `separation_curve`, or the patch's minimum-parameter corner when the
    /// curve is empty. The release axis runs through the same point, so the
    /// default puts it on the patch's edge; control points near the axis
    /// flip push direction and a side face can kink. Only control points
    /// move; weights, knots, degrees and periodicity are carried over.
    #[instrument(skip(self, patch, separation_curve), fields(control_points = patch.control_points.len()))]
    pub fn apply_draft(
        &self,
        patch: &RationalSurfacePatch,
        release_direction: Vec3,
        angle_degrees: f64,
        separation_curve: &[Point3d],
    ) -> Result<RationalSurfacePatch> {
        patch.validate()?;
        if !(0.0..=MAX_DRAFT_ANGLE).contains(&angle_degrees) {
            return Err(MoldError::InvalidParameter(format!(
                "draft angle {angle_degrees} outside [0, {MAX_DRAFT_ANGLE}] degrees"
            )));
        }
        let normal = release_direction.normalized().ok_or_else(|| {
            MoldError::InvalidParameter(format!("release direction {release_direction:?} has no length"))
        })?;
        let origin = separation_curve
            .first()
            .copied()
            .unwrap_or_else(|| patch.min_corner_point());

        let tan = angle_degrees.to_radians().tan();
        let mut moved = 0usize;
        let control_points: Vec<Point3d> = patch
            .control_points
            .iter()
            .map(|&p| {
                let offset = p - origin;
                let h = offset.dot(&normal);
                let radial = offset - normal * h;
                let r = radial.length();
                if r > SEAM_EPS && h.abs() > SEAM_EPS {
                    moved += 1;
                    p + radial * (h.abs() * tan * h.signum() / r)
                } else {
                    p
                }
            })
            .collect();

        let drafted = patch
            .with_control_points(control_points)
            .map_err(|e| MoldError::TransformFailed(e.to_string()))?;
        info!(angle_degrees, moved, "draft applied");
        Ok(drafted)
    }
}
