use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, instrument};

use super::brep::*;
use crate::geometry::curves::{Curve, Line3d};
use crate::geometry::point::Point3d;
use crate::geometry::surfaces::{Plane, Surface};

/// Reasons an indexed polygon soup cannot become a closed B-rep.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolyhedronError {
    #[error("face {face} has {count} corners, need at least 3")]
    TooFewCorners { face: usize, count: usize },
    #[error("face {face} references point {index}, only {points} points exist")]
    IndexOutOfRange { face: usize, index: usize, points: usize },
    #[error("face {face} has zero area")]
    DegenerateFace { face: usize },
    #[error("edge {a}->{b} is used twice in the same direction")]
    NonManifoldEdge { a: usize, b: usize },
    #[error("edge {a}->{b} has no opposite half-edge; the surface is open")]
    OpenEdge { a: usize, b: usize },
}

/// Build a solid from planar polygons over a shared point list. Every edge
/// must be used exactly once in each direction, so the polygons must form
/// closed, consistently wound surfaces. Each edge-connected component
/// becomes its own outward shell.
#[instrument(skip_all, fields(points = points.len(), faces = faces.len()))]
pub fn make_polyhedron(
    store: &mut EntityStore,
    points: &[Point3d],
    faces: &[Vec<usize>],
) -> Result<SolidId, PolyhedronError> {
    let area_floor = crate::default_tolerance().coincidence.powi(2);
    let mut directed: HashMap<(usize, usize), usize> = HashMap::new();
    let mut normals = Vec::with_capacity(faces.len());

    for (fi, face) in faces.iter().enumerate() {
        if face.len() < 3 {
            return Err(PolyhedronError::TooFewCorners {
                face: fi,
                count: face.len(),
            });
        }
        if let Some(&index) = face.iter().find(|&&i| i >= points.len()) {
            return Err(PolyhedronError::IndexOutOfRange {
                face: fi,
                index,
                points: points.len(),
            });
        }
        let corners: Vec<Point3d> = face.iter().map(|&i| points[i]).collect();
        let area = polygon_area_vector(&corners);
        let normal = area.normalized().filter(|_| area.length() > area_floor);
        normals.push(normal.ok_or(PolyhedronError::DegenerateFace { face: fi })?);

        for k in 0..face.len() {
            let (a, b) = (face[k], face[(k + 1) % face.len()]);
            if directed.insert((a, b), fi).is_some() {
                return Err(PolyhedronError::NonManifoldEdge { a, b });
            }
        }
    }
    if let Some(&(a, b)) = directed.keys().find(|&&(a, b)| !directed.contains_key(&(b, a))) {
        return Err(PolyhedronError::OpenEdge { a, b });
    }

    let components = edge_components(faces, &directed);
    let solid_id = store.solids.insert(Solid { shells: vec![] });
    let mut vertex_ids: HashMap<usize, VertexId> = HashMap::new();
    let mut edge_map: HashMap<(VertexId, VertexId), HalfEdgeId> = HashMap::new();

    for component in &components {
        let shell_id = store.shells.insert(Shell {
            faces: vec![],
            orientation: ShellOrientation::Outward,
            solid: solid_id,
        });
        store.solids[solid_id].shells.push(shell_id);

        for &fi in component {
            let face = &faces[fi];
            let corners: Vec<VertexId> = face
                .iter()
                .map(|&i| {
                    *vertex_ids.entry(i).or_insert_with(|| {
                        store.vertices.insert(Vertex {
                            point: points[i],
                            tolerance: crate::default_tolerance().coincidence,
                        })
                    })
                })
                .collect();

            let anchor = Point3d::centroid(&face.iter().map(|&i| points[i]).collect::<Vec<_>>());
            let face_id = insert_face(store, shell_id, Surface::Plane(Plane::new(anchor, normals[fi])));
            let loop_id = store.faces[face_id].outer_loop;
            for k in 0..corners.len() {
                let next = (k + 1) % corners.len();
                create_face_edge_twinned(store, corners[k], corners[next], face_id, loop_id, &mut edge_map);
            }
        }
    }

    debug!(shells = components.len(), vertices = vertex_ids.len(), "polyhedron assembled");
    Ok(solid_id)
}

/// Faces grouped by edge connectivity, each group in ascending face order.
fn edge_components(faces: &[Vec<usize>], directed: &HashMap<(usize, usize), usize>) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..faces.len()).collect();
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    for (&(a, b), &f) in directed {
        if let Some(&g) = directed.get(&(b, a)) {
            let (ra, rb) = (find(&mut parent, f), find(&mut parent, g));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }
    }
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut slot: HashMap<usize, usize> = HashMap::new();
    for f in 0..faces.len() {
        let root = find(&mut parent, f);
        let idx = *slot.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[idx].push(f);
    }
    groups
}

fn insert_face(store: &mut EntityStore, shell_id: ShellId, surface: Surface) -> FaceId {
    let loop_id = store.loops.insert(Loop {
        half_edges: vec![],
        face: FaceId::default(),
    });
    let face_id = store.faces.insert(Face {
        surface,
        outer_loop: loop_id,
        inner_loops: vec![],
        same_sense: true,
        shell: shell_id,
    });
    store.loops[loop_id].face = face_id;
    store.shells[shell_id].faces.push(face_id);
    face_id
}

/// Faceted cylinder along +Z with its base centre at `center`.
#[instrument(skip(store), fields(center = ?[center.x, center.y, center.z]))]
pub fn make_cylinder(
    store: &mut EntityStore,
    center: Point3d,
    radius: f64,
    height: f64,
    num_segments: usize,
) -> Result<SolidId, PolyhedronError> {
    info!(radius, height, num_segments, "creating cylinder primitive");
    let n = num_segments;
    let mut points = Vec::with_capacity(2 * n);
    for i in 0..n {
        let angle = std::f64::consts::TAU * (i as f64) / (n as f64);
        let (x, y) = (center.x + radius * angle.cos(), center.y + radius * angle.sin());
        points.push(Point3d::new(x, y, center.z));
        points.push(Point3d::new(x, y, center.z + height));
    }
    let bottom = |i: usize| 2 * (i % n);
    let top = |i: usize| 2 * (i % n) + 1;

    let mut faces = Vec::with_capacity(n + 2);
    // Bottom cap winds clockwise seen from above so its normal is -Z.
    faces.push((0..n).rev().map(bottom).collect());
    faces.push((0..n).map(top).collect());
    for i in 0..n {
        faces.push(vec![bottom(i), bottom(i + 1), top(i + 1), top(i)]);
    }
    make_polyhedron(store, &points, &faces)
}

/// Create a half-edge for a face, reusing an existing edge if this vertex pair
/// was already seen (twin linking). The `edge_map` tracks the first half-edge
/// created for each canonical (min, max) vertex pair.
pub(crate) fn create_face_edge_twinned(
    store: &mut EntityStore,
    v_start: VertexId,
    v_end: VertexId,
    face_id: FaceId,
    loop_id: LoopId,
    edge_map: &mut HashMap<(VertexId, VertexId), HalfEdgeId>,
) -> HalfEdgeId {
    let p_start = store.vertices[v_start].point;
    let p_end = store.vertices[v_end].point;

    let forward = v_start < v_end;
    let edge_key = if forward { (v_start, v_end) } else { (v_end, v_start) };

    let he_id = store.half_edges.insert(HalfEdge {
        edge: EdgeId::default(),
        twin: HalfEdgeId::default(),
        face: face_id,
        loop_id,
        start_vertex: v_start,
        end_vertex: v_end,
        t_start: 0.0,
        t_end: p_start.distance_to(&p_end),
        forward,
    });
    store.loops[loop_id].half_edges.push(he_id);

    if let Some(&twin_he_id) = edge_map.get(&edge_key) {
        let edge_id = store.half_edges[twin_he_id].edge;
        store.half_edges[he_id].twin = twin_he_id;
        store.half_edges[he_id].edge = edge_id;
        store.half_edges[twin_he_id].twin = he_id;
        store.edges[edge_id].half_edges.1 = he_id;
    } else {
        let (e_start, e_end, line) = if forward {
            (v_start, v_end, Line3d::from_points(p_start, p_end))
        } else {
            (v_end, v_start, Line3d::from_points(p_end, p_start))
        };
        let edge_id = store.edges.insert(Edge {
            curve: Curve::Line(line),
            half_edges: (he_id, HalfEdgeId::default()),
            start_vertex: e_start,
            end_vertex: e_end,
        });
        store.half_edges[he_id].edge = edge_id;
        edge_map.insert(edge_key, he_id);
    }

    he_id
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Axis-aligned box as six outward-wound quads.
    pub(crate) fn box_polygons(min: Point3d, max: Point3d) -> (Vec<Point3d>, Vec<Vec<usize>>) {
        let points = (0..8)
            .map(|i| {
                Point3d::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                )
            })
            .collect();
        let faces = vec![
            vec![0, 2, 3, 1],
            vec![4, 5, 7, 6],
            vec![0, 1, 5, 4],
            vec![2, 6, 7, 3],
            vec![0, 4, 6, 2],
            vec![1, 3, 7, 5],
        ];
        (points, faces)
    }

    fn assert_twin_invariants(store: &EntityStore, solid_id: SolidId) {
        for face_id in store.solid_faces(solid_id) {
            let loop_data = &store.loops[store.faces[face_id].outer_loop];
            for &he_id in &loop_data.half_edges {
                let he = &store.half_edges[he_id];
                assert_ne!(he_id, he.twin, "half-edge is its own twin");
                let twin = &store.half_edges[he.twin];
                assert_eq!(twin.twin, he_id, "twin symmetry violated");
                assert_ne!(he.face, twin.face, "twins share a face");
                assert_eq!(twin.start_vertex, he.end_vertex);
            }
        }
    }

    #[test]
    fn test_box_polyhedron_topology() {
        let mut store = EntityStore::new();
        let (points, faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 2.0, 3.0));
        let solid_id = make_polyhedron(&mut store, &points, &faces).unwrap();
        let shell_id = store.solids[solid_id].shells[0];
        assert_eq!(store.count_topology(shell_id), (8, 12, 6));
        assert_twin_invariants(&store, solid_id);
        let audit = audit_solid(&store, solid_id);
        assert!(audit.all_valid(), "{:?}", audit.errors);
        let bb = store.solid_bounding_box(solid_id);
        assert!((bb.max.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_components_become_two_shells() {
        let mut store = EntityStore::new();
        let (mut points, mut faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let (p2, f2) = box_polygons(Point3d::new(3.0, 0.0, 0.0), Point3d::new(4.0, 1.0, 1.0));
        faces.extend(f2.into_iter().map(|f| f.into_iter().map(|i| i + 8).collect()));
        points.extend(p2);
        let solid_id = make_polyhedron(&mut store, &points, &faces).unwrap();
        assert_eq!(store.solids[solid_id].shells.len(), 2);
        assert!(audit_solid(&store, solid_id).all_valid());
    }

    #[test]
    fn test_polyhedron_rejects_open_and_bad_faces() {
        let (points, mut faces) = box_polygons(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let mut store = EntityStore::new();
        let mut open = faces.clone();
        open.pop();
        assert!(matches!(
            make_polyhedron(&mut store, &points, &open),
            Err(PolyhedronError::OpenEdge { .. })
        ));
        let mut flipped = faces.clone();
        flipped[0].reverse();
        assert!(matches!(
            make_polyhedron(&mut store, &points, &flipped),
            Err(PolyhedronError::NonManifoldEdge { .. })
        ));
        faces[0] = vec![0, 2];
        assert!(matches!(
            make_polyhedron(&mut store, &points, &faces),
            Err(PolyhedronError::TooFewCorners { face: 0, count: 2 })
        ));
        faces[0] = vec![0, 1, 0];
        assert!(matches!(
            make_polyhedron(&mut store, &points, &faces),
            Err(PolyhedronError::DegenerateFace { face: 0 })
        ));
    }

    #[test]
    fn test_make_cylinder() {
        let mut store = EntityStore::new();
        let solid_id = make_cylinder(&mut store, Point3d::ORIGIN, 5.0, 10.0, 16).unwrap();
        let shell_id = store.solids[solid_id].shells[0];
        // V = 2N, E = 3N, F = N + 2.
        assert_eq!(store.count_topology(shell_id), (32, 48, 18));
        assert_twin_invariants(&store, solid_id);
        let bottom = store.solid_faces(solid_id)[0];
        assert!(store.face_area_vector(bottom).z < 0.0);
    }
}
