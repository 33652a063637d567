//! Configuration for the B-Rep validation system.

use super::types::ValidationLevel;

/// Tolerance thresholds for validation checks.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceConfig {
    /// Position resolution; points closer than this are coincident.
    pub resolution: f64,
    /// Faces with a smaller area are reported as degenerate.
    pub min_face_area: f64,
    /// Maximum distance of a face vertex from the face's plane.
    pub planarity: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            resolution: 1e-7,
            min_face_area: 1e-12,
            planarity: 1e-6,
        }
    }
}

/// Configuration controlling which checks are run and their parameters.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// The maximum validation level to run.
    pub level: ValidationLevel,
    /// Tolerance thresholds.
    pub tolerance: ToleranceConfig,
    /// Whether to require a positive enclosed volume (geometry level only).
    pub check_volume: bool,
    /// Whether to test faces for mutual intersection (geometry level only).
    pub check_self_intersection: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            level: ValidationLevel::Geometry,
            tolerance: ToleranceConfig::default(),
            check_volume: true,
            check_self_intersection: true,
        }
    }
}

impl ValidationConfig {
    /// Topology-only validation (fastest).
    pub fn topology() -> Self {
        Self {
            level: ValidationLevel::Topology,
            check_volume: false,
            check_self_intersection: false,
            ..Self::default()
        }
    }

    /// Topology + geometric consistency, including the volume sign and
    /// self-intersection.
    pub fn geometry() -> Self {
        Self::default()
    }
}
