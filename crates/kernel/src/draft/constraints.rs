//! Manufacturability report for a region of base faces: undercuts and draft
//! angles against one release direction.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::geometry::vector::Vec3;
use crate::subdivision::LimitSurfaceEvaluator;

use super::analysis::{DraftAnalysis, FaceDraft};
use super::undercut::{UndercutConfig, UndercutDetector};

/// Drafts below this many degrees cannot be released.
pub const MIN_DRAFT_ANGLE: f64 = 0.5;

/// Drafts below this many degrees release but drag on the mold.
pub const RECOMMENDED_DRAFT_ANGLE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintLevel {
    /// The region cannot be molded as modelled.
    Error,
    /// The region molds but is hard on the tooling.
    Warning,
}

impl ConstraintLevel {
    pub fn suggestion(self) -> &'static str {
        match self {
            ConstraintLevel::Error => "This region requires revision to eliminate physical impossibility",
            ConstraintLevel::Warning => "Consider adjusting geometry for better manufacturability",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub level: ConstraintLevel,
    pub face: usize,
    pub description: String,
    /// In `[0, 1]`.
    pub severity: f64,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            ConstraintLevel::Error => "ERROR",
            ConstraintLevel::Warning => "WARN",
        };
        write!(
            f,
            "[{level}] face {}: {} (severity {:.2}); {}",
            self.face,
            self.description,
            self.severity,
            self.level.suggestion()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintReport {
    pub violations: Vec<ConstraintViolation>,
}

impl ConstraintReport {
    pub fn add_error(&mut self, face: usize, description: impl Into<String>, severity: f64) {
        self.push(ConstraintLevel::Error, face, description.into(), severity);
    }

    pub fn add_warning(&mut self, face: usize, description: impl Into<String>, severity: f64) {
        self.push(ConstraintLevel::Warning, face, description.into(), severity);
    }

    fn push(&mut self, level: ConstraintLevel, face: usize, description: String, severity: f64) {
        self.violations.push(ConstraintViolation {
            level,
            face,
            description,
            severity: severity.clamp(0.0, 1.0),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.count(ConstraintLevel::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(ConstraintLevel::Warning)
    }

    fn count(&self, level: ConstraintLevel) -> usize {
        self.violations.iter().filter(|v| v.level == level).count()
    }

    pub fn for_face(&self, face: usize) -> impl Iterator<Item = &ConstraintViolation> {
        self.violations.iter().filter(move |v| v.face == face)
    }
}

impl fmt::Display for ConstraintReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ConstraintReport: errors={}, warnings={}",
            self.error_count(),
            self.warning_count()
        )?;
        for v in &self.violations {
            writeln!(f, "  {v}")?;
        }
        Ok(())
    }
}

/// Checks a region of base faces against the release constraints.
///
/// Undercut faces and faces drafted below [`MIN_DRAFT_ANGLE`] are errors;
/// faces below [`RECOMMENDED_DRAFT_ANGLE`] are warnings. Draft is measured
/// at each face's parametric centre.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintValidator<'a> {
    evaluator: &'a LimitSurfaceEvaluator,
    undercuts: UndercutDetector<'a>,
}

impl<'a> ConstraintValidator<'a> {
    pub fn new(evaluator: &'a LimitSurfaceEvaluator) -> Self {
        Self::with_undercut_config(evaluator, UndercutConfig::default())
    }

    pub fn with_undercut_config(evaluator: &'a LimitSurfaceEvaluator, config: UndercutConfig) -> Self {
        Self {
            evaluator,
            undercuts: UndercutDetector::with_config(evaluator, config),
        }
    }

    #[instrument(skip(self, faces), fields(faces = faces.len()))]
    pub fn validate_region(&self, faces: &[usize], release_direction: Vec3) -> Result<ConstraintReport> {
        let analysis = DraftAnalysis::new(release_direction)?;
        let mut report = ConstraintReport::default();

        for undercut in self.undercuts.detect_undercuts(faces, release_direction)? {
            report.add_error(
                undercut.face,
                "Undercut along the release direction requires an additional mold piece",
                undercut.severity,
            );
        }

        for FaceDraft { face, angle_degrees } in analysis.face_drafts(self.evaluator, faces)? {
            if angle_degrees < MIN_DRAFT_ANGLE {
                report.add_error(
                    face,
                    format!("Draft angle {angle_degrees:.2} deg is below the minimum of {MIN_DRAFT_ANGLE} deg"),
                    shortfall(angle_degrees, MIN_DRAFT_ANGLE),
                );
            } else if angle_degrees < RECOMMENDED_DRAFT_ANGLE {
                report.add_warning(
                    face,
                    format!(
                        "Draft angle {angle_degrees:.2} deg is below the recommended {RECOMMENDED_DRAFT_ANGLE} deg"
                    ),
                    shortfall(angle_degrees, RECOMMENDED_DRAFT_ANGLE),
                );
            }
        }

        if report.has_errors() {
            warn!(
                errors = report.error_count(),
                warnings = report.warning_count(),
                "region violates release constraints"
            );
        } else {
            info!(warnings = report.warning_count(), "region constraints checked");
        }
        Ok(report)
    }
}

/// How far `angle` falls short of `limit`, as a fraction of the limit.
fn shortfall(angle: f64, limit: f64) -> f64 {
    (1.0 - angle / limit).clamp(0.0, 1.0)
}
