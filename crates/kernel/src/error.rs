use thiserror::Error;

use crate::boolean::engine::BooleanFailure;
use crate::geometry::nurbs::PatchError;
use crate::topology::primitives::PolyhedronError;

/// Failure modes of the mold-generation pipeline.
///
/// Every variant is local to the call that produced it: no evaluator, patch or
/// solid is left half-mutated when one of these is returned.
#[derive(Debug, Error)]
pub enum MoldError {
    /// A query was issued before the evaluator received a control cage.
    #[error("Evaluator not initialized: {0}")]
    NotInitialized(String),

    /// Malformed cage, empty face list, non-positive density and similar.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Out-of-range parameter (u/v, draft angle, subdivision level, thickness).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Capability the kernel does not provide, e.g. multi-face fitting.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Batch inputs of unequal length.
    #[error("Size mismatch: faces={faces}, us={us}, vs={vs}")]
    SizeMismatch { faces: usize, us: usize, vs: usize },

    /// No patch in the patch table covers the requested location.
    #[error("No patch covers face {face} at (u={u}, v={v})")]
    PatchLookup { face: usize, u: f64, v: f64 },

    #[error("Surface fitting failed: {0}")]
    FittingFailed(String),

    #[error("Draft transformation failed: {0}")]
    TransformFailed(String),

    #[error("Invalid solid: {0}")]
    InvalidSolid(String),

    /// Broken internal invariant (for example a sample-count mismatch).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<BooleanFailure> for MoldError {
    fn from(failure: BooleanFailure) -> Self {
        MoldError::InvalidSolid(failure.to_string())
    }
}

impl From<PolyhedronError> for MoldError {
    fn from(err: PolyhedronError) -> Self {
        MoldError::InvalidSolid(err.to_string())
    }
}

impl From<PatchError> for MoldError {
    fn from(err: PatchError) -> Self {
        MoldError::InvalidInput(err.to_string())
    }
}

/// Result alias used throughout the kernel.
pub type Result<T> = std::result::Result<T, MoldError>;
