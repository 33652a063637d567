//! Catmull-Clark limit-surface evaluation.
//!
//! Two fidelity tiers:
//! - [`EvalTier::CornerInterpolation`] interpolates the base face's corners
//!   directly and needs no refinement.
//! - [`EvalTier::Exact`] evaluates the limit surface through a
//!   [`PatchTable`] that is built lazily, at most once per evaluator.

pub mod cage;
pub mod evaluator;
pub mod patch_table;
pub mod refiner;
pub mod tessellation;

use serde::{Deserialize, Serialize};

use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;

pub use cage::{ControlCage, Crease};
pub use evaluator::LimitSurfaceEvaluator;
pub use patch_table::{PatchTable, PatchType};
pub use tessellation::TessellationResult;

/// Which evaluation path answers a point query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalTier {
    /// Bilinear (quads), barycentric (triangles) or centroid (n-gons) over
    /// the base face corners.
    #[default]
    CornerInterpolation,
    /// Exact limit surface via the patch table.
    Exact,
}

/// Lifecycle of a [`LimitSurfaceEvaluator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorState {
    Uninitialized,
    Initialized,
    PatchTableBuilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// Maximum refinement depth around extraordinary vertices before
    /// falling back to bilinear end caps. Values below 1 are raised to 1.
    pub isolation_level: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { isolation_level: 4 }
    }
}

/// One evaluated point of the limit surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitSample {
    pub face: usize,
    pub u: f64,
    pub v: f64,
    pub position: Point3d,
    pub du: Option<Vec3>,
    pub dv: Option<Vec3>,
    pub duu: Option<Vec3>,
    pub dvv: Option<Vec3>,
    pub duv: Option<Vec3>,
    pub normal: Option<Vec3>,
}
