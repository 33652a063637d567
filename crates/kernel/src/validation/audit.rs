use tracing::{debug, instrument};

use super::config::ToleranceConfig;
use crate::topology::brep::*;

/// L0: Topological invariant checks.
#[instrument(skip(store))]
pub fn verify_topology_l0(store: &EntityStore, solid_id: SolidId) -> TopologyAudit {
    let audit = audit_solid(store, solid_id);
    debug!(
        euler_valid = audit.euler_valid,
        all_faces_closed = audit.all_faces_closed,
        all_edges_two_faced = audit.all_edges_two_faced,
        no_dangling_vertices = audit.no_dangling_vertices,
        normals_consistent = audit.normals_consistent,
        error_count = audit.errors.len(),
        "topology L0 audit complete"
    );
    audit
}

#[derive(Debug, Clone)]
pub enum GeometryError {
    VertexCurveMismatch { vertex: VertexId, edge: EdgeId, distance: f64 },
    ZeroLengthEdge { edge: EdgeId, length: f64 },
    VertexOffSurface { vertex: VertexId, face: FaceId, distance: f64 },
    ZeroAreaFace { face: FaceId, area: f64 },
}

/// Geometric facts gathered alongside the L1 errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometrySummary {
    pub min_face_area: Option<f64>,
    pub max_planarity_gap: f64,
}

/// L1: Geometric consistency of vertices, edge curves and planar faces.
#[instrument(skip(store, tolerance))]
pub fn verify_geometry_l1(
    store: &EntityStore,
    solid_id: SolidId,
    tolerance: &ToleranceConfig,
) -> (Vec<GeometryError>, GeometrySummary) {
    let mut errors = Vec::new();
    let mut summary = GeometrySummary::default();

    for face_id in store.solid_faces(solid_id) {
        let face = &store.faces[face_id];

        let area = store.face_area_vector(face_id).length();
        summary.min_face_area = Some(summary.min_face_area.map_or(area, |a: f64| a.min(area)));
        if area < tolerance.min_face_area {
            errors.push(GeometryError::ZeroAreaFace { face: face_id, area });
        }

        for &he_id in &store.loops[face.outer_loop].half_edges {
            let Some(he) = store.half_edges.get(he_id) else {
                continue;
            };
            let Some(edge) = store.edges.get(he.edge) else {
                continue;
            };
            let start = store.vertices[edge.start_vertex].point;
            let end = store.vertices[edge.end_vertex].point;
            let length = start.distance_to(&end);
            if length < tolerance.resolution {
                errors.push(GeometryError::ZeroLengthEdge { edge: he.edge, length });
            }

            // The edge's curve runs from its start vertex to its end vertex
            // over [0, length]; half-edges may traverse it in reverse.
            for (vertex, expected, t) in [(edge.start_vertex, start, 0.0), (edge.end_vertex, end, length)] {
                let distance = edge.curve.evaluate(t).distance_to(&expected);
                if distance > tolerance.resolution {
                    errors.push(GeometryError::VertexCurveMismatch {
                        vertex,
                        edge: he.edge,
                        distance,
                    });
                }
            }

            let gap = face.surface.distance_to_point(&store.vertices[he.start_vertex].point).abs();
            summary.max_planarity_gap = summary.max_planarity_gap.max(gap);
            if gap > tolerance.planarity {
                errors.push(GeometryError::VertexOffSurface {
                    vertex: he.start_vertex,
                    face: face_id,
                    distance: gap,
                });
            }
        }
    }

    debug!(geometry_error_count = errors.len(), "geometry L1 check complete");
    (errors, summary)
}
