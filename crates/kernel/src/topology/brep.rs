use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use slotmap::{Key, SlotMap, new_key_type};

use crate::geometry::bounds::BoundingBox;
use crate::geometry::curves::Curve;
use crate::geometry::point::Point3d;
use crate::geometry::surfaces::Surface;
use crate::geometry::vector::Vec3;

// ─── Entity Keys ─────────────────────────────────────────────────────────────

new_key_type! {
    pub struct VertexId;
    pub struct EdgeId;
    pub struct HalfEdgeId;
    pub struct LoopId;
    pub struct FaceId;
    pub struct ShellId;
    pub struct SolidId;
}

// ─── Topological Entities ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    pub point: Point3d,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub curve: Curve,
    pub half_edges: (HalfEdgeId, HalfEdgeId),
    pub start_vertex: VertexId,
    pub end_vertex: VertexId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HalfEdge {
    pub edge: EdgeId,
    pub twin: HalfEdgeId,
    pub face: FaceId,
    pub loop_id: LoopId,
    pub start_vertex: VertexId,
    pub end_vertex: VertexId,
    /// Parameter range on the edge's curve.
    pub t_start: f64,
    pub t_end: f64,
    /// true if this half-edge traverses the curve in the forward direction.
    pub forward: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    pub half_edges: Vec<HalfEdgeId>,
    pub face: FaceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub surface: Surface,
    pub outer_loop: LoopId,
    pub inner_loops: Vec<LoopId>,
    /// true if the face normal agrees with the surface normal.
    pub same_sense: bool,
    pub shell: ShellId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShellOrientation {
    /// Outer shell (normals point outward).
    Outward,
    /// Void shell (normals point inward, represents a cavity).
    Inward,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shell {
    pub faces: Vec<FaceId>,
    pub orientation: ShellOrientation,
    pub solid: SolidId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solid {
    pub shells: Vec<ShellId>,
}

// ─── Entity Store ────────────────────────────────────────────────────────────

/// Arena-based storage for all topological entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStore {
    pub vertices: SlotMap<VertexId, Vertex>,
    pub edges: SlotMap<EdgeId, Edge>,
    pub half_edges: SlotMap<HalfEdgeId, HalfEdge>,
    pub loops: SlotMap<LoopId, Loop>,
    pub faces: SlotMap<FaceId, Face>,
    pub shells: SlotMap<ShellId, Shell>,
    pub solids: SlotMap<SolidId, Solid>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count topological entities for a shell: (vertices, edges, faces).
    pub fn count_topology(&self, shell_id: ShellId) -> (usize, usize, usize) {
        let shell = &self.shells[shell_id];
        let mut edge_set = HashSet::new();
        let mut vertex_set = HashSet::new();

        for &face_id in &shell.faces {
            for loop_id in self.face_loops(face_id) {
                for &he_id in &self.loops[loop_id].half_edges {
                    if let Some(he) = self.half_edges.get(he_id) {
                        edge_set.insert(he.edge.data().as_ffi());
                        vertex_set.insert(he.start_vertex.data().as_ffi());
                        vertex_set.insert(he.end_vertex.data().as_ffi());
                    }
                }
            }
        }

        (vertex_set.len(), edge_set.len(), shell.faces.len())
    }

    /// Outer loop followed by the inner loops of a face.
    pub fn face_loops(&self, face_id: FaceId) -> impl Iterator<Item = LoopId> + '_ {
        let face = &self.faces[face_id];
        std::iter::once(face.outer_loop).chain(face.inner_loops.iter().copied())
    }

    /// All faces of a solid, shell by shell.
    pub fn solid_faces(&self, solid_id: SolidId) -> Vec<FaceId> {
        self.solids[solid_id]
            .shells
            .iter()
            .flat_map(|&shell_id| self.shells[shell_id].faces.iter().copied())
            .collect()
    }

    /// Vertex positions around a loop, in traversal order.
    pub fn loop_points(&self, loop_id: LoopId) -> Vec<Point3d> {
        self.loops[loop_id]
            .half_edges
            .iter()
            .filter_map(|&he_id| self.half_edges.get(he_id))
            .filter_map(|he| self.vertices.get(he.start_vertex))
            .map(|v| v.point)
            .collect()
    }

    /// Newell area vector of a face's outer loop: direction is the winding
    /// normal, length is the enclosed area.
    pub fn face_area_vector(&self, face_id: FaceId) -> Vec3 {
        polygon_area_vector(&self.loop_points(self.faces[face_id].outer_loop))
    }

    /// Compute axis-aligned bounding box for a solid.
    pub fn solid_bounding_box(&self, solid_id: SolidId) -> BoundingBox {
        let mut bb = BoundingBox::empty();
        for face_id in self.solid_faces(solid_id) {
            for p in self.loop_points(self.faces[face_id].outer_loop) {
                bb.expand_to_include(&p);
            }
        }
        bb
    }

    /// Get the outward-facing normal of a face at a parameter point.
    pub fn face_normal(&self, face_id: FaceId, u: f64, v: f64) -> Vec3 {
        let face = &self.faces[face_id];
        let n = face.surface.normal_at(u, v);
        if face.same_sense { n } else { -n }
    }

    /// Drop every entity not reachable from `keep`. Keys of kept entities
    /// stay valid.
    pub fn retain_solid(&mut self, keep: SolidId) {
        let mut shells = HashSet::new();
        let mut faces = HashSet::new();
        let mut loops = HashSet::new();
        let mut half_edges = HashSet::new();
        let mut edges = HashSet::new();
        let mut vertices = HashSet::new();

        for &shell_id in &self.solids[keep].shells {
            shells.insert(shell_id);
            for &face_id in &self.shells[shell_id].faces {
                faces.insert(face_id);
                for loop_id in self.face_loops(face_id) {
                    loops.insert(loop_id);
                    for &he_id in &self.loops[loop_id].half_edges {
                        half_edges.insert(he_id);
                        if let Some(he) = self.half_edges.get(he_id) {
                            edges.insert(he.edge);
                            vertices.insert(he.start_vertex);
                            vertices.insert(he.end_vertex);
                        }
                    }
                }
            }
        }

        self.solids.retain(|id, _| id == keep);
        self.shells.retain(|id, _| shells.contains(&id));
        self.faces.retain(|id, _| faces.contains(&id));
        self.loops.retain(|id, _| loops.contains(&id));
        self.half_edges.retain(|id, _| half_edges.contains(&id));
        self.edges.retain(|id, _| edges.contains(&id));
        self.vertices.retain(|id, _| vertices.contains(&id));
    }
}

/// Half the sum of cross products of consecutive corners (Newell's method).
pub fn polygon_area_vector(points: &[Point3d]) -> Vec3 {
    let n = points.len();
    if n < 3 {
        return Vec3::ZERO;
    }
    let mut sum = Vec3::ZERO;
    for i in 0..n {
        sum += points[i].to_vec3().cross(&points[(i + 1) % n].to_vec3());
    }
    sum * 0.5
}

// ─── Topology Audit ─────────────────────────────────────────────────────────

/// Result of a topological consistency check.
#[derive(Debug, Clone)]
pub struct TopologyAudit {
    pub euler_valid: bool,
    pub all_edges_two_faced: bool,
    pub all_faces_closed: bool,
    pub no_dangling_vertices: bool,
    pub shells_closed: bool,
    pub normals_consistent: bool,
    pub errors: Vec<TopologyError>,
}

#[derive(Debug, Clone)]
pub enum TopologyError {
    EulerViolation {
        shell: ShellId,
        v: usize,
        e: usize,
        f: usize,
        expected_chi: i64,
        actual_chi: i64,
    },
    OpenLoop {
        loop_id: LoopId,
    },
    DanglingVertex {
        vertex: VertexId,
    },
    HalfEdgeTwinMismatch {
        half_edge: HalfEdgeId,
    },
    /// Twin half-edges run the same way along their edge.
    InconsistentOrientation {
        half_edge: HalfEdgeId,
    },
}

impl TopologyAudit {
    pub fn all_valid(&self) -> bool {
        self.euler_valid
            && self.all_edges_two_faced
            && self.all_faces_closed
            && self.no_dangling_vertices
            && self.shells_closed
            && self.normals_consistent
    }
}

/// Perform a full topology audit on a solid.
pub fn audit_solid(store: &EntityStore, solid_id: SolidId) -> TopologyAudit {
    let solid = &store.solids[solid_id];
    let mut errors = Vec::new();
    let mut euler_valid = true;
    let mut all_faces_closed = true;
    let mut all_edges_two_faced = true;
    let mut normals_consistent = true;
    let mut used_vertices = HashSet::new();
    let mut used_edges = HashSet::new();

    for &shell_id in &solid.shells {
        // Euler-Poincaré: V - E + F = 2 for genus-0 closed shells.
        let (v, e, f) = store.count_topology(shell_id);
        let chi = v as i64 - e as i64 + f as i64;
        if chi != 2 {
            euler_valid = false;
            errors.push(TopologyError::EulerViolation {
                shell: shell_id,
                v,
                e,
                f,
                expected_chi: 2,
                actual_chi: chi,
            });
        }

        for &face_id in &store.shells[shell_id].faces {
            for loop_id in store.face_loops(face_id) {
                if !is_loop_closed(store, loop_id) {
                    all_faces_closed = false;
                    errors.push(TopologyError::OpenLoop { loop_id });
                }
                for &he_id in &store.loops[loop_id].half_edges {
                    let Some(he) = store.half_edges.get(he_id) else {
                        all_faces_closed = false;
                        errors.push(TopologyError::OpenLoop { loop_id });
                        continue;
                    };
                    used_vertices.insert(he.start_vertex);
                    used_edges.insert(he.edge);
                    match store.half_edges.get(he.twin) {
                        Some(twin) if he.twin != he_id && twin.twin == he_id && twin.face != he.face => {
                            if twin.start_vertex != he.end_vertex || twin.end_vertex != he.start_vertex {
                                normals_consistent = false;
                                errors.push(TopologyError::InconsistentOrientation { half_edge: he_id });
                            }
                        }
                        _ => {
                            all_edges_two_faced = false;
                            errors.push(TopologyError::HalfEdgeTwinMismatch { half_edge: he_id });
                        }
                    }
                }
            }
        }
    }

    // Edge endpoints must be corners of some loop of the solid. Other solids
    // may share the store, so unrelated vertices are not inspected.
    let mut no_dangling_vertices = true;
    let mut reported = HashSet::new();
    for edge in used_edges.iter().filter_map(|&e| store.edges.get(e)) {
        for vertex in [edge.start_vertex, edge.end_vertex] {
            if !used_vertices.contains(&vertex) && reported.insert(vertex) {
                no_dangling_vertices = false;
                errors.push(TopologyError::DanglingVertex { vertex });
            }
        }
    }

    TopologyAudit {
        euler_valid,
        all_edges_two_faced,
        all_faces_closed,
        no_dangling_vertices,
        shells_closed: euler_valid && all_faces_closed && all_edges_two_faced,
        normals_consistent,
        errors,
    }
}

/// A loop is closed when each half-edge starts where the previous one ends,
/// wrapping around from last to first.
fn is_loop_closed(store: &EntityStore, loop_id: LoopId) -> bool {
    let half_edges = &store.loops[loop_id].half_edges;
    if half_edges.len() < 3 {
        return false;
    }
    let hes: Option<Vec<&HalfEdge>> = half_edges.iter().map(|&id| store.half_edges.get(id)).collect();
    let Some(hes) = hes else {
        return false;
    };
    (0..hes.len()).all(|i| hes[i].end_vertex == hes[(i + 1) % hes.len()].start_vertex)
}
