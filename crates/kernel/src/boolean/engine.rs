use thiserror::Error;
use tracing::{debug, instrument};

use crate::geometry::bounds::BoundingBox;
use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;
use crate::topology::brep::*;
use crate::topology::primitives::{PolyhedronError, make_polyhedron};

use super::mesh::{Containment, PointWelder, TriMesh, cancel_opposites, is_needle, repair_t_junctions};
use super::split::{CutPlane, crossing_segment};
use super::triangulate::triangulate_with_segments;

/// Structured failure information for Boolean operations.
#[derive(Debug, Error)]
pub enum BooleanFailure {
    #[error("Operand solid has no faces")]
    EmptyOperand,

    #[error("Boolean result has no faces")]
    EmptyResult,

    #[error("T-junction repair did not settle after {splits} splits")]
    RepairDiverged { splits: usize },

    #[error("Result is not a closed manifold: {0}")]
    NonManifoldResult(#[from] PolyhedronError),
}

/// Union of two closed triangulated solids, built as a new solid in `store`.
///
/// Strategy:
/// 1. Disjoint bounding boxes: both meshes become shells of one solid.
/// 2. Triangulate every triangle against the segments where it crosses the
///    other mesh.
/// 3. Keep pieces outside the other solid; coplanar pieces survive once
///    when both sides face the same way.
/// 4. Weld, drop slivers, repair T-junctions and rebuild the B-rep.
#[instrument(skip(store))]
pub fn mesh_union(
    store: &mut EntityStore,
    solid_a: SolidId,
    solid_b: SolidId,
    relative_tolerance: f64,
) -> Result<SolidId, BooleanFailure> {
    let mesh_a = TriMesh::from_solid(store, solid_a);
    let mesh_b = TriMesh::from_solid(store, solid_b);
    if mesh_a.triangles.is_empty() || mesh_b.triangles.is_empty() {
        return Err(BooleanFailure::EmptyOperand);
    }

    let bb_a = mesh_a.bounding_box();
    let bb_b = mesh_b.bounding_box();
    let scale = bb_a.union(&bb_b).diagonal();
    // Keeps every surviving sliver above the validator's area floor.
    let eps = (relative_tolerance * scale).max(2e-6);

    if !bb_a.expanded(eps).intersects(&bb_b) {
        debug!("bounding boxes disjoint, combining shells");
        let offset = mesh_a.points.len();
        let mut points = mesh_a.points;
        points.extend(mesh_b.points);
        let faces: Vec<Vec<usize>> = mesh_a
            .triangles
            .iter()
            .map(|t| t.to_vec())
            .chain(mesh_b.triangles.iter().map(|t| t.iter().map(|i| i + offset).collect()))
            .collect();
        return Ok(make_polyhedron(store, &points, &faces)?);
    }

    let planes_a = mesh_planes(&mesh_a);
    let planes_b = mesh_planes(&mesh_b);
    let (segments_a, segments_b) = crossing_segments(&mesh_a, &planes_a, &mesh_b, &planes_b, eps);

    let fragments_a = fragment(&mesh_a, &segments_a, eps);
    let fragments_b = fragment(&mesh_b, &segments_b, eps);
    debug!(
        fragments_a = fragments_a.len(),
        fragments_b = fragments_b.len(),
        "triangles fragmented"
    );

    let mut kept: Vec<[Point3d; 3]> = Vec::new();
    for (piece, normal) in &fragments_a {
        match mesh_b.classify(&Point3d::centroid(piece), eps) {
            Containment::Outside => kept.push(*piece),
            Containment::OnSurface(other) if other.dot(normal) > 0.0 => kept.push(*piece),
            _ => {}
        }
    }
    for (piece, _) in &fragments_b {
        if mesh_a.classify(&Point3d::centroid(piece), eps) == Containment::Outside {
            kept.push(*piece);
        }
    }

    let mut welder = PointWelder::new(eps);
    let triangles: Vec<[usize; 3]> = kept.iter().map(|piece| piece.map(|p| welder.insert(p))).collect();
    let points = welder.points;
    let triangles: Vec<[usize; 3]> = triangles.into_iter().filter(|t| !is_needle(&points, t, eps)).collect();

    let max_splits = 16 * (triangles.len() + points.len());
    let triangles = repair_t_junctions(&points, triangles, eps, max_splits)
        .ok_or(BooleanFailure::RepairDiverged { splits: max_splits })?;
    let triangles = cancel_opposites(triangles);
    if triangles.is_empty() {
        return Err(BooleanFailure::EmptyResult);
    }
    debug!(triangles = triangles.len(), points = points.len(), "union mesh assembled");

    let faces: Vec<Vec<usize>> = triangles.iter().map(|t| t.to_vec()).collect();
    Ok(make_polyhedron(store, &points, &faces)?)
}

fn mesh_planes(mesh: &TriMesh) -> Vec<Option<CutPlane>> {
    (0..mesh.triangles.len())
        .map(|t| CutPlane::through_triangle(&mesh.triangle(t)))
        .collect()
}

type Segment = (Point3d, Point3d);

/// For each triangle of either mesh, the segments where it crosses
/// triangles of the other mesh.
fn crossing_segments(
    mesh_a: &TriMesh,
    planes_a: &[Option<CutPlane>],
    mesh_b: &TriMesh,
    planes_b: &[Option<CutPlane>],
    eps: f64,
) -> (Vec<Vec<Segment>>, Vec<Vec<Segment>>) {
    let boxes_b: Vec<BoundingBox> = (0..mesh_b.triangles.len())
        .map(|t| BoundingBox::from_points(&mesh_b.triangle(t)).expanded(eps))
        .collect();
    let mut segments_a = vec![Vec::new(); mesh_a.triangles.len()];
    let mut segments_b = vec![Vec::new(); mesh_b.triangles.len()];

    for (ta, plane_a) in planes_a.iter().enumerate() {
        let Some(plane_a) = plane_a else { continue };
        let tri_a = mesh_a.triangle(ta);
        let box_a = BoundingBox::from_points(&tri_a);
        for (tb, plane_b) in planes_b.iter().enumerate() {
            let Some(plane_b) = plane_b else { continue };
            if !boxes_b[tb].intersects(&box_a) {
                continue;
            }
            if let Some(segment) = crossing_segment(&tri_a, plane_a, &mesh_b.triangle(tb), plane_b, eps) {
                segments_a[ta].push(segment);
                segments_b[tb].push(segment);
            }
        }
    }
    (segments_a, segments_b)
}

/// Pieces of every triangle after triangulating it against its crossing
/// segments, each paired with its source triangle's normal.
fn fragment(mesh: &TriMesh, segments: &[Vec<Segment>], eps: f64) -> Vec<([Point3d; 3], Vec3)> {
    let mut out = Vec::with_capacity(mesh.triangles.len());
    for (t, list) in segments.iter().enumerate() {
        let tri = mesh.triangle(t);
        let Some(own) = CutPlane::through_triangle(&tri) else {
            continue;
        };
        out.extend(
            triangulate_with_segments(&tri, list, eps)
                .into_iter()
                .map(|piece| (piece, own.normal)),
        );
    }
    out
}
