//! Out-of-sample check of fitted patches against the exact limit surface.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::geometry::nurbs::RationalSurfacePatch;
use crate::subdivision::{EvalTier, LimitSurfaceEvaluator};

/// Deviation statistics between a patch and the limit surface, in model
/// units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FitQualityReport {
    pub max_deviation: f64,
    pub mean_deviation: f64,
    pub rms_deviation: f64,
    pub sample_count: usize,
    pub passes_tolerance: bool,
}

impl FitQualityReport {
    /// Summarize per-sample distances. An empty population gives the zero
    /// report, which never passes.
    pub fn from_deviations(deviations: &[f64], tolerance: f64) -> Self {
        if deviations.is_empty() {
            return Self::default();
        }
        let n = deviations.len() as f64;
        let max = deviations.iter().copied().fold(0.0, f64::max);
        let mean = deviations.iter().sum::<f64>() / n;
        let rms = (deviations.iter().map(|d| d * d).sum::<f64>() / n).sqrt();
        Self {
            max_deviation: max,
            mean_deviation: mean,
            // Rounding must not break mean <= rms <= max.
            rms_deviation: rms.clamp(mean.min(max), max),
            sample_count: deviations.len(),
            passes_tolerance: max < tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuditConfig {
    /// Samples per direction per face, taken at cell midpoints
    /// `(i + 0.5) / density`. At equal densities these stay off the fitter's
    /// `i / (n - 1)` grid.
    pub density: usize,
    pub tolerance: f64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            density: 20,
            tolerance: 0.1,
        }
    }
}

/// Compares fitted patches against an evaluator's exact limit surface.
#[derive(Debug, Clone, Copy)]
pub struct FitQualityAuditor<'a> {
    evaluator: &'a LimitSurfaceEvaluator,
    config: AuditConfig,
}

impl<'a> FitQualityAuditor<'a> {
    pub fn new(evaluator: &'a LimitSurfaceEvaluator) -> Self {
        Self::with_config(evaluator, AuditConfig::default())
    }

    pub fn with_config(evaluator: &'a LimitSurfaceEvaluator, config: AuditConfig) -> Self {
        Self { evaluator, config }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Deviation of `patch` from the limit surface of `faces`, sampled at
    /// the midpoints of a regular grid. Never fails: unusable input yields
    /// the zero report.
    #[instrument(skip(self, patch))]
    pub fn check_fitting_quality(&self, patch: &RationalSurfacePatch, faces: &[usize]) -> FitQualityReport {
        if faces.is_empty() {
            warn!("no faces to audit");
            return FitQualityReport::default();
        }
        if let Err(err) = patch.validate() {
            warn!(%err, "patch is not usable for auditing");
            return FitQualityReport::default();
        }
        let density = self.config.density.max(1);

        let mut deviations = Vec::with_capacity(faces.len() * density * density);
        for &face in faces {
            for i in 0..density {
                let u = (i as f64 + 0.5) / density as f64;
                for j in 0..density {
                    let v = (j as f64 + 0.5) / density as f64;
                    match self.evaluator.evaluate_point_with(face, u, v, EvalTier::Exact) {
                        Ok(exact) => deviations.push(exact.distance_to(&patch.evaluate(u, v))),
                        Err(err) => {
                            warn!(face, u, v, %err, "limit surface sample failed, audit abandoned");
                            return FitQualityReport::default();
                        }
                    }
                }
            }
        }

        let report = FitQualityReport::from_deviations(&deviations, self.config.tolerance);
        info!(
            max = report.max_deviation,
            rms = report.rms_deviation,
            samples = report.sample_count,
            passes = report.passes_tolerance,
            "fit quality audited"
        );
        report
    }
}
