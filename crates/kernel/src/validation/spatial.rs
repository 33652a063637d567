//! Spatial coherence: no two faces of a solid may pass through each other.

use crate::boolean::split::{CutPlane, triangles_cross};
use crate::geometry::bounds::BoundingBox;
use crate::geometry::point::Point3d;
use crate::topology::brep::*;

use super::config::ToleranceConfig;
use super::types::*;

/// Triangle-based self-intersection detection.
///
/// Fan-triangulates every face loop and tests non-adjacent triangles with a
/// sweep-and-prune broad phase along x and a segment-overlap narrow phase.
/// Only the first intersection is reported.
pub fn check_self_intersection(
    store: &EntityStore,
    solid_id: SolidId,
    tol: &ToleranceConfig,
    errors: &mut Vec<ValidationError>,
) {
    let mut triangles: Vec<([Point3d; 3], CutPlane, FaceId)> = Vec::new();
    for face_id in store.solid_faces(solid_id) {
        for loop_id in store.face_loops(face_id) {
            let corners: Vec<Point3d> = store.loops[loop_id]
                .half_edges
                .iter()
                .filter_map(|&he_id| store.half_edges.get(he_id))
                .filter_map(|he| store.vertices.get(he.start_vertex))
                .map(|v| v.point)
                .collect();
            for i in 1..corners.len().saturating_sub(1) {
                let tri = [corners[0], corners[i], corners[i + 1]];
                if let Some(plane) = CutPlane::through_triangle(&tri) {
                    triangles.push((tri, plane, face_id));
                }
            }
        }
    }
    if triangles.len() < 2 {
        return;
    }

    let boxes: Vec<BoundingBox> = triangles.iter().map(|(tri, _, _)| BoundingBox::from_points(tri)).collect();
    let scale = boxes.iter().fold(BoundingBox::empty(), |acc, b| acc.union(b)).diagonal();
    let eps = tol.resolution.max(1e-9 * scale);

    let mut order: Vec<usize> = (0..triangles.len()).collect();
    order.sort_by(|&a, &b| boxes[a].min.x.total_cmp(&boxes[b].min.x));

    for (k, &i) in order.iter().enumerate() {
        let reach = boxes[i].expanded(eps);
        for &j in &order[k + 1..] {
            if boxes[j].min.x > reach.max.x {
                break;
            }
            if !reach.intersects(&boxes[j]) {
                continue;
            }
            let (tri_a, plane_a, face_a) = &triangles[i];
            let (tri_b, plane_b, face_b) = &triangles[j];
            if shares_vertex(tri_a, tri_b, eps) {
                continue;
            }
            if triangles_cross(tri_a, plane_a, tri_b, plane_b, eps) {
                errors.push(ValidationError {
                    entity_type: EntityType::Face,
                    entity_id: EntityId::Face(*face_a),
                    parent_id: Some(EntityId::Face(*face_b)),
                    code: ErrorCode::SelfIntersection,
                    message: "Faces pass through each other".into(),
                    severity: Severity::Error,
                    numeric_value: None,
                    tolerance: Some(eps),
                });
                return;
            }
        }
    }
}

fn shares_vertex(a: &[Point3d; 3], b: &[Point3d; 3], eps: f64) -> bool {
    a.iter().any(|va| b.iter().any(|vb| va.distance_to(vb) <= eps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::primitives::tests::box_polygons;
    use crate::topology::primitives::{make_cylinder, make_polyhedron};

    fn crossings(store: &EntityStore, solid_id: SolidId) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_self_intersection(store, solid_id, &ToleranceConfig::default(), &mut errors);
        errors
    }

    #[test]
    fn test_box_no_self_intersection() {
        let mut store = EntityStore::new();
        let (points, faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let solid_id = make_polyhedron(&mut store, &points, &faces).unwrap();
        assert!(crossings(&store, solid_id).is_empty());
    }

    #[test]
    fn test_cylinder_no_self_intersection() {
        let mut store = EntityStore::new();
        let solid_id = make_cylinder(&mut store, Point3d::ORIGIN, 1.0, 2.0, 24).unwrap();
        assert!(crossings(&store, solid_id).is_empty());
    }

    #[test]
    fn test_interpenetrating_shells_detected() {
        let (mut points, mut faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let (other_points, other_faces) =
            box_polygons(Point3d::new(0.5, 0.25, 0.25), Point3d::new(1.5, 0.75, 0.75));
        let offset = points.len();
        points.extend(other_points);
        faces.extend(
            other_faces
                .into_iter()
                .map(|f| f.into_iter().map(|i| i + offset).collect::<Vec<_>>()),
        );
        let mut store = EntityStore::new();
        let solid_id = make_polyhedron(&mut store, &points, &faces).unwrap();

        let errors = crossings(&store, solid_id);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::SelfIntersection);
        assert_eq!(errors[0].entity_type, EntityType::Face);
    }

    #[test]
    fn test_touching_shells_are_not_crossing() {
        let (mut points, mut faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let (other_points, other_faces) = box_polygons(Point3d::new(2.0, 0.0, 0.0), Point3d::new(3.0, 1.0, 1.0));
        let offset = points.len();
        points.extend(other_points);
        faces.extend(
            other_faces
                .into_iter()
                .map(|f| f.into_iter().map(|i| i + offset).collect::<Vec<_>>()),
        );
        let mut store = EntityStore::new();
        let solid_id = make_polyhedron(&mut store, &points, &faces).unwrap();
        assert!(crossings(&store, solid_id).is_empty());
    }
}
