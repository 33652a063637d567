//! One-call mold piece generation: fit, audit, draft, thicken and key a
//! single base face of the limit surface.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::audit::{AuditConfig, FitQualityAuditor, FitQualityReport};
use crate::boolean::{BooleanEngine, MeshBooleanEngine};
use crate::draft::{ConstraintReport, ConstraintValidator, DraftAnalysis, DraftTransformer};
use crate::error::Result;
use crate::fitting::{FitOptions, SurfaceFitter};
use crate::geometry::nurbs::RationalSurfacePatch;
use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;
use crate::solid::{ManufacturableSolid, SolidSynthesizer};
use crate::subdivision::LimitSurfaceEvaluator;

/// Grid used to report the drafted patch's smallest draft angle.
const DRAFT_REPORT_SAMPLES: usize = 10;

/// Per-run mold settings. Fields missing from a serialized config take their
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoldParameters {
    pub draft_angle_degrees: f64,
    pub wall_thickness: f64,
    pub release_direction: Vec3,
    pub sample_density: usize,
    /// Parting-line points; the first one anchors the draft plane and the
    /// release axis. Left empty, the drafted patch's own minimum corner is
    /// used, which puts the axis on the patch's edge: side faces then get a
    /// sharp change in push direction across their control net and thick
    /// walls fold. Set an anchor away from the face for side faces.
    pub separation_curve: Vec<Point3d>,
    /// Base centres of the registration keys.
    pub key_positions: Vec<Point3d>,
}

impl Default for MoldParameters {
    fn default() -> Self {
        Self {
            draft_angle_degrees: 2.0,
            wall_thickness: 10.0,
            release_direction: Vec3::Z,
            sample_density: 30,
            separation_curve: Vec::new(),
            key_positions: Vec::new(),
        }
    }
}

/// Everything produced for one base face.
#[derive(Debug, Clone)]
pub struct MoldPiece {
    pub face: usize,
    /// Patch straight out of the fitter.
    pub fitted: RationalSurfacePatch,
    /// Fitted patch after draft.
    pub drafted: RationalSurfacePatch,
    /// Audit of `fitted` against the limit surface.
    pub quality: FitQualityReport,
    /// Undercut and draft check of the base face before draft is applied.
    pub constraints: ConstraintReport,
    /// Smallest draft angle over the drafted patch, in degrees.
    pub min_draft_degrees: Option<f64>,
    pub solid: ManufacturableSolid,
}

pub struct MoldPipeline<'a, E: BooleanEngine = MeshBooleanEngine> {
    evaluator: &'a LimitSurfaceEvaluator,
    fit_options: FitOptions,
    audit: AuditConfig,
    synthesizer: SolidSynthesizer<E>,
}

impl<'a> MoldPipeline<'a, MeshBooleanEngine> {
    pub fn new(evaluator: &'a LimitSurfaceEvaluator) -> Self {
        Self::with_synthesizer(evaluator, SolidSynthesizer::new())
    }
}

impl<'a, E: BooleanEngine> MoldPipeline<'a, E> {
    pub fn with_synthesizer(evaluator: &'a LimitSurfaceEvaluator, synthesizer: SolidSynthesizer<E>) -> Self {
        Self {
            evaluator,
            fit_options: FitOptions::default(),
            audit: AuditConfig::default(),
            synthesizer,
        }
    }

    pub fn with_fit_options(mut self, options: FitOptions) -> Self {
        self.fit_options = options;
        self
    }

    pub fn with_audit_config(mut self, config: AuditConfig) -> Self {
        self.audit = config;
        self
    }

    /// Build the mold piece for one base face. A poor fit and constraint
    /// violations are reported in the piece, not treated as errors.
    #[instrument(skip(self, params))]
    pub fn build_piece(&self, face: usize, params: &MoldParameters) -> Result<MoldPiece> {
        let fitted = SurfaceFitter::with_options(self.evaluator, self.fit_options)
            .fit_surface(&[face], params.sample_density)?;

        let quality = FitQualityAuditor::with_config(self.evaluator, self.audit).check_fitting_quality(&fitted, &[face]);
        if !quality.passes_tolerance {
            warn!(face, max = quality.max_deviation, "fit exceeds audit tolerance");
        }
        let constraints = ConstraintValidator::new(self.evaluator).validate_region(&[face], params.release_direction)?;

        let drafted = DraftTransformer::new().apply_draft(
            &fitted,
            params.release_direction,
            params.draft_angle_degrees,
            &params.separation_curve,
        )?;
        let min_draft_degrees =
            DraftAnalysis::new(params.release_direction)?.patch_min_draft(&drafted, DRAFT_REPORT_SAMPLES);

        let solid = self.synthesizer.create_solid(&drafted, params.wall_thickness)?;
        let solid = self.synthesizer.add_registration_keys(solid, &params.key_positions)?;

        info!(face, faces = solid.face_count(), "mold piece built");
        Ok(MoldPiece {
            face,
            fitted,
            drafted,
            quality,
            constraints,
            min_draft_degrees,
            solid,
        })
    }

    /// Build one piece per face. A failing face does not stop the others.
    pub fn build_pieces(&self, faces: &[usize], params: &MoldParameters) -> Vec<(usize, Result<MoldPiece>)> {
        faces
            .iter()
            .map(|&face| {
                let piece = self.build_piece(face, params);
                if let Err(err) = &piece {
                    warn!(face, %err, "mold piece failed");
                }
                (face, piece)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MoldError;
    use crate::subdivision::ControlCage;

    fn plane_evaluator() -> LimitSurfaceEvaluator {
        LimitSurfaceEvaluator::from_cage(ControlCage::new(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(2.0, 0.0, 0.0),
                Point3d::new(2.0, 2.0, 0.0),
                Point3d::new(0.0, 2.0, 0.0),
            ],
            vec![vec![0, 1, 2, 3]],
        ))
        .unwrap()
    }

    #[test]
    fn test_planar_piece_with_defaults() {
        let eval = plane_evaluator();
        let piece = MoldPipeline::new(&eval)
            .build_piece(0, &MoldParameters::default())
            .unwrap();

        assert!(piece.quality.passes_tolerance);
        assert_eq!(piece.quality.sample_count, 400);
        assert!(piece.solid.report.valid);
        assert!(piece.constraints.violations.is_empty());
        // Every control point lies on the separation plane, so draft is a no-op.
        assert_eq!(piece.fitted.control_points, piece.drafted.control_points);
        assert!((piece.solid.volume() - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_failing_face_does_not_stop_others() {
        let eval = plane_evaluator();
        let pieces = MoldPipeline::new(&eval).build_pieces(&[0, 3], &MoldParameters::default());
        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].1.is_ok());
        assert!(matches!(pieces[1].1, Err(MoldError::InvalidParameter(_))));
    }

    #[test]
    fn test_bad_draft_angle_aborts_piece() {
        let eval = plane_evaluator();
        let params = MoldParameters {
            draft_angle_degrees: 50.0,
            ..MoldParameters::default()
        };
        let err = MoldPipeline::new(&eval).build_piece(0, &params).unwrap_err();
        assert!(matches!(err, MoldError::InvalidParameter(_)));
    }

    #[test]
    fn test_parameters_from_partial_json() {
        let json = r#"{"wall_thickness": 4.0, "key_positions": [{"x": 1.0, "y": 2.0, "z": 0.0}]}"#;
        let params: MoldParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.wall_thickness, 4.0);
        assert_eq!(params.key_positions, vec![Point3d::new(1.0, 2.0, 0.0)]);
        assert_eq!(params.draft_angle_degrees, 2.0);
        assert_eq!(params.release_direction, Vec3::Z);
        assert_eq!(params.sample_density, 30);
        assert!(params.separation_curve.is_empty());
    }
}
