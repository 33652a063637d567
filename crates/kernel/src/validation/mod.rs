pub mod audit;
pub mod config;
pub mod spatial;
pub mod types;
pub mod volume;

pub use config::*;
pub use types::*;

use std::collections::HashSet;

use slotmap::Key;
use tracing::{debug, instrument};

use crate::topology::brep::*;

/// Unified B-Rep validation engine.
///
/// Runs hierarchical checks at increasing levels of sophistication:
/// - **Topology** (L0-1): Euler formula, twin consistency, loop closure,
///   orientation, dangling vertices.
/// - **Geometry** (L2): vertex-on-curve, degenerate edges/faces, planarity,
///   a positive enclosed volume and no self-intersection.
pub struct BRepValidator {
    config: ValidationConfig,
}

impl Default for BRepValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl BRepValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a solid, returning a unified report.
    #[instrument(skip(self, store))]
    pub fn validate(&self, store: &EntityStore, solid_id: SolidId) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut metrics = ValidationMetrics {
            entity_counts: compute_entity_counts(store, solid_id),
            ..ValidationMetrics::default()
        };

        self.check_topology(store, solid_id, &mut errors, &mut warnings);
        let mut level_completed = ValidationLevel::Topology;

        if self.config.level >= ValidationLevel::Geometry {
            self.check_geometry(store, solid_id, &mut errors, &mut metrics);
            level_completed = ValidationLevel::Geometry;
        }

        let valid = errors.is_empty();
        debug!(
            valid,
            level = ?level_completed,
            error_count = errors.len(),
            warning_count = warnings.len(),
            "validation complete"
        );

        ValidationReport {
            valid,
            level_completed,
            errors,
            warnings,
            metrics,
        }
    }

    /// Adapt the topology audit into ValidationError format.
    fn check_topology(
        &self,
        store: &EntityStore,
        solid_id: SolidId,
        errors: &mut Vec<ValidationError>,
        warnings: &mut Vec<ValidationError>,
    ) {
        let audit = audit::verify_topology_l0(store, solid_id);

        for topo_err in &audit.errors {
            let (entity_type, entity_id, code, message, value) = match topo_err {
                TopologyError::EulerViolation {
                    shell,
                    v,
                    e,
                    f,
                    expected_chi,
                    actual_chi,
                } => (
                    EntityType::Shell,
                    EntityId::Shell(*shell),
                    ErrorCode::EulerPoincareViolation,
                    format!("Euler formula violated: V={v} E={e} F={f}, chi={actual_chi} (expected {expected_chi})"),
                    Some(*actual_chi as f64),
                ),
                TopologyError::OpenLoop { loop_id } => (
                    EntityType::Loop,
                    EntityId::Loop(*loop_id),
                    ErrorCode::WireNotClosed,
                    "Loop does not close: a half-edge does not start where the previous one ends".into(),
                    None,
                ),
                TopologyError::DanglingVertex { vertex } => (
                    EntityType::Vertex,
                    EntityId::Vertex(*vertex),
                    ErrorCode::DanglingReference,
                    "Edge endpoint is not a corner of any loop of the solid".into(),
                    None,
                ),
                TopologyError::HalfEdgeTwinMismatch { half_edge } => (
                    EntityType::HalfEdge,
                    EntityId::HalfEdge(*half_edge),
                    ErrorCode::HalfEdgeTwinMismatch,
                    "Half-edge twin is missing or does not point back to this half-edge".into(),
                    None,
                ),
                TopologyError::InconsistentOrientation { half_edge } => (
                    EntityType::HalfEdge,
                    EntityId::HalfEdge(*half_edge),
                    ErrorCode::InconsistentEdgeOrientation,
                    "Twin half-edges traverse their edge in the same direction".into(),
                    None,
                ),
            };
            errors.push(ValidationError {
                entity_type,
                entity_id,
                parent_id: Some(EntityId::Solid(solid_id)),
                code,
                message,
                severity: Severity::Error,
                numeric_value: value,
                tolerance: None,
            });
        }

        if audit.errors.is_empty() && store.solids[solid_id].shells.len() > 1 {
            warnings.push(ValidationError {
                entity_type: EntityType::Solid,
                entity_id: EntityId::Solid(solid_id),
                parent_id: None,
                code: ErrorCode::DanglingReference,
                message: format!(
                    "Solid consists of {} disconnected shells",
                    store.solids[solid_id].shells.len()
                ),
                severity: Severity::Warning,
                numeric_value: None,
                tolerance: None,
            });
        }
    }

    fn check_geometry(
        &self,
        store: &EntityStore,
        solid_id: SolidId,
        errors: &mut Vec<ValidationError>,
        metrics: &mut ValidationMetrics,
    ) {
        let tol = &self.config.tolerance;
        let (geom_errors, summary) = audit::verify_geometry_l1(store, solid_id, tol);
        metrics.min_face_area = summary.min_face_area;
        metrics.max_planarity_gap = summary.max_planarity_gap;

        for ge in &geom_errors {
            let error = match ge {
                audit::GeometryError::VertexCurveMismatch { vertex, edge, distance } => ValidationError {
                    entity_type: EntityType::Vertex,
                    entity_id: EntityId::Vertex(*vertex),
                    parent_id: Some(EntityId::Edge(*edge)),
                    code: ErrorCode::InvalidPointOnCurve,
                    message: format!("Vertex not on curve endpoint (gap={distance:.2e})"),
                    severity: Severity::Error,
                    numeric_value: Some(*distance),
                    tolerance: Some(tol.resolution),
                },
                audit::GeometryError::ZeroLengthEdge { edge, length } => ValidationError {
                    entity_type: EntityType::Edge,
                    entity_id: EntityId::Edge(*edge),
                    parent_id: None,
                    code: ErrorCode::ZeroLengthEdge,
                    message: format!("Edge length {length:.2e} below resolution"),
                    severity: Severity::Error,
                    numeric_value: Some(*length),
                    tolerance: Some(tol.resolution),
                },
                audit::GeometryError::VertexOffSurface { vertex, face, distance } => ValidationError {
                    entity_type: EntityType::Vertex,
                    entity_id: EntityId::Vertex(*vertex),
                    parent_id: Some(EntityId::Face(*face)),
                    code: ErrorCode::InvalidPointOnSurface,
                    message: format!("Vertex lies off its face plane (gap={distance:.2e})"),
                    severity: Severity::Error,
                    numeric_value: Some(*distance),
                    tolerance: Some(tol.planarity),
                },
                audit::GeometryError::ZeroAreaFace { face, area } => ValidationError {
                    entity_type: EntityType::Face,
                    entity_id: EntityId::Face(*face),
                    parent_id: None,
                    code: ErrorCode::ZeroAreaFace,
                    message: format!("Face area {area:.2e} is degenerate"),
                    severity: Severity::Error,
                    numeric_value: Some(*area),
                    tolerance: Some(tol.min_face_area),
                },
            };
            errors.push(error);
        }

        if self.config.check_volume {
            let volume = volume::signed_volume(store, solid_id);
            metrics.volume = Some(volume);
            if volume <= 0.0 {
                errors.push(ValidationError {
                    entity_type: EntityType::Solid,
                    entity_id: EntityId::Solid(solid_id),
                    parent_id: None,
                    code: ErrorCode::NegativeVolume,
                    message: format!("Enclosed volume {volume:.3e} is not positive; faces wind inward"),
                    severity: Severity::Error,
                    numeric_value: Some(volume),
                    tolerance: Some(0.0),
                });
            }
        }

        if self.config.check_self_intersection {
            spatial::check_self_intersection(store, solid_id, tol, errors);
        }
    }
}

/// Count topological entities for a solid.
fn compute_entity_counts(store: &EntityStore, solid_id: SolidId) -> EntityCounts {
    let solid = &store.solids[solid_id];
    let mut vertex_set = HashSet::new();
    let mut edge_set = HashSet::new();
    let mut he_count = 0usize;
    let mut face_count = 0usize;
    let mut loop_count = 0usize;

    for face_id in store.solid_faces(solid_id) {
        face_count += 1;
        for loop_id in store.face_loops(face_id) {
            loop_count += 1;
            for &he_id in &store.loops[loop_id].half_edges {
                he_count += 1;
                if let Some(he) = store.half_edges.get(he_id) {
                    edge_set.insert(he.edge.data().as_ffi());
                    vertex_set.insert(he.start_vertex.data().as_ffi());
                    vertex_set.insert(he.end_vertex.data().as_ffi());
                }
            }
        }
    }

    EntityCounts {
        vertices: vertex_set.len(),
        edges: edge_set.len(),
        half_edges: he_count,
        faces: face_count,
        shells: solid.shells.len(),
        loops: loop_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::tests::box_polygons;
    use crate::topology::primitives::{make_cylinder, make_polyhedron};

    fn unit_box(store: &mut EntityStore) -> SolidId {
        let (points, faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        make_polyhedron(store, &points, &faces).unwrap()
    }

    #[test]
    fn test_box_passes_validation() {
        let mut store = EntityStore::new();
        let solid_id = unit_box(&mut store);

        let report = BRepValidator::default().validate(&store, solid_id);

        assert!(report.valid, "Box should pass validation: {report}");
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.level_completed, ValidationLevel::Geometry);
        assert_eq!(report.metrics.entity_counts.vertices, 8);
        assert_eq!(report.metrics.entity_counts.edges, 12);
        assert_eq!(report.metrics.entity_counts.faces, 6);
        assert_eq!(report.metrics.entity_counts.shells, 1);
        assert_eq!(report.metrics.entity_counts.loops, 6);
        assert_eq!(report.metrics.entity_counts.half_edges, 24);
        assert!((report.metrics.volume.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cylinder_passes_validation() {
        let mut store = EntityStore::new();
        let solid_id = make_cylinder(&mut store, Point3d::ORIGIN, 1.0, 2.0, 16).unwrap();
        let report = BRepValidator::default().validate(&store, solid_id);
        assert!(report.valid, "Cylinder should pass validation: {report}");
    }

    #[test]
    fn test_corrupted_twin_detected() {
        let mut store = EntityStore::new();
        let solid_id = unit_box(&mut store);

        let he_id = store.half_edges.keys().next().unwrap();
        store.half_edges[he_id].twin = he_id;

        let report = BRepValidator::new(ValidationConfig::topology()).validate(&store, solid_id);
        assert!(!report.valid, "Corrupted twin should fail validation");
        assert!(!report.errors_of(ErrorCode::HalfEdgeTwinMismatch).is_empty());
        assert!(report.no_errors_of(ErrorCode::WireNotClosed));
    }

    #[test]
    fn test_removed_face_euler_violation() {
        let mut store = EntityStore::new();
        let solid_id = unit_box(&mut store);
        let shell_id = store.solids[solid_id].shells[0];
        store.shells[shell_id].faces.pop();

        let report = BRepValidator::new(ValidationConfig::topology()).validate(&store, solid_id);
        assert!(!report.valid, "Missing face should cause Euler violation");
        assert!(!report.no_errors_of(ErrorCode::EulerPoincareViolation));
    }

    #[test]
    fn test_open_loop_detected() {
        let mut store = EntityStore::new();
        let solid_id = unit_box(&mut store);
        let shell_id = store.solids[solid_id].shells[0];
        let face_id = store.shells[shell_id].faces[0];
        let loop_id = store.faces[face_id].outer_loop;
        store.loops[loop_id].half_edges.pop();

        let report = BRepValidator::new(ValidationConfig::topology()).validate(&store, solid_id);
        assert!(!report.valid, "Open loop should fail validation");
        assert!(!report.no_errors_of(ErrorCode::WireNotClosed));
    }

    #[test]
    fn test_inside_out_box_has_negative_volume() {
        let mut store = EntityStore::new();
        let (points, mut faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        faces.iter_mut().for_each(|f| f.reverse());
        let solid_id = make_polyhedron(&mut store, &points, &faces).unwrap();

        let report = BRepValidator::default().validate(&store, solid_id);
        assert!(!report.valid);
        assert_eq!(report.errors_of(ErrorCode::NegativeVolume).len(), 1);

        let topo_only = BRepValidator::new(ValidationConfig::topology()).validate(&store, solid_id);
        assert!(topo_only.valid);
    }

    #[test]
    fn test_interpenetrating_shells_fail_geometry() {
        let (mut points, mut faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let (inner_points, inner_faces) = box_polygons(Point3d::new(0.5, 0.5, 0.5), Point3d::new(2.0, 2.0, 2.0));
        let offset = points.len();
        points.extend(inner_points);
        faces.extend(inner_faces.into_iter().map(|f| f.into_iter().map(|i| i + offset).collect::<Vec<_>>()));
        let mut store = EntityStore::new();
        let solid_id = make_polyhedron(&mut store, &points, &faces).unwrap();

        let report = BRepValidator::default().validate(&store, solid_id);
        assert!(!report.valid);
        assert_eq!(report.errors_of(ErrorCode::SelfIntersection).len(), 1);

        let topo_only = BRepValidator::new(ValidationConfig::topology()).validate(&store, solid_id);
        assert!(topo_only.no_errors_of(ErrorCode::SelfIntersection));
    }
}
