pub mod error;
pub mod geometry;
pub mod topology;
pub mod subdivision;
pub mod fitting;
pub mod draft;
pub mod boolean;
pub mod validation;
pub mod solid;
pub mod audit;
pub mod pipeline;

// Re-export the component entry points at crate root for convenience.
pub use audit::{FitQualityAuditor, FitQualityReport};
pub use boolean::{BooleanEngine, MeshBooleanEngine};
pub use draft::{ConstraintReport, ConstraintValidator, DraftTransformer, UndercutDetector};
pub use error::{MoldError, Result};
pub use fitting::{FitOptions, SurfaceFitter};
pub use geometry::nurbs::RationalSurfacePatch;
pub use pipeline::{MoldParameters, MoldPiece, MoldPipeline};
pub use solid::{KeyConfig, ManufacturableSolid, SolidConfig, SolidSynthesizer, WallSide};
pub use subdivision::{
    ControlCage, Crease, EvalTier, EvaluatorConfig, EvaluatorState, LimitSample, LimitSurfaceEvaluator,
    TessellationResult,
};

/// Global tolerance configuration for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Points closer than this are considered coincident (model units).
    pub coincidence: f64,
    /// Parameter-space tolerance for curve/surface evaluations.
    pub parametric: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            coincidence: 1e-7,
            parametric: 1e-9,
        }
    }
}

impl Tolerance {
    /// Whether a parameter lies in the closed unit interval, allowing for
    /// parametric round-off at both ends.
    pub fn in_unit_interval(&self, t: f64) -> bool {
        t.is_finite() && t >= -self.parametric && t <= 1.0 + self.parametric
    }
}

/// Default tolerance used by the kernel's constructors.
pub fn default_tolerance() -> Tolerance {
    Tolerance::default()
}
