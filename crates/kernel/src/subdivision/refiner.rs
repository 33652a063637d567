use std::collections::HashMap;

use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;

use super::cage::ControlCage;

/// Where a face of a refined level sits inside the base cage's parameter
/// space: the base face, the corner tile of that face (always 0 for quads) and
/// the square `[u0, u0 + size] x [v0, v0 + size]` it covers inside the tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchParam {
    pub base_face: usize,
    pub tile: usize,
    pub u0: f64,
    pub v0: f64,
    pub size: f64,
    pub depth: usize,
}

impl PatchParam {
    fn base(base_face: usize) -> Self {
        Self {
            base_face,
            tile: 0,
            u0: 0.0,
            v0: 0.0,
            size: 1.0,
            depth: 0,
        }
    }

    /// Whether tile-local coordinates fall inside this face's square.
    pub fn contains(&self, ut: f64, vt: f64, eps: f64) -> bool {
        ut >= self.u0 - eps && ut <= self.u0 + self.size + eps && vt >= self.v0 - eps && vt <= self.v0 + self.size + eps
    }

    /// Map tile-local coordinates into this face's own unit square.
    pub fn normalize(&self, ut: f64, vt: f64) -> (f64, f64) {
        (
            ((ut - self.u0) / self.size).clamp(0.0, 1.0),
            ((vt - self.v0) / self.size).clamp(0.0, 1.0),
        )
    }
}

/// Layout of the corner tiles of a base face in its (u, v) square.
///
/// Quads use the whole square. Any other face is split into one sub-quad per
/// corner, placed row by row in a `cols x cols` grid; tiles past the corner
/// count are left uncovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub corners: usize,
    pub cols: usize,
}

impl TileLayout {
    pub fn for_face(corners: usize) -> Self {
        let cols = if corners == 4 {
            1
        } else {
            (corners as f64).sqrt().ceil() as usize
        };
        Self { corners, cols }
    }

    /// Tile index and tile-local coordinates of a base (u, v), or `None` when
    /// the location falls in an unused tile.
    pub fn locate(&self, u: f64, v: f64) -> Option<(usize, f64, f64)> {
        let n = self.cols as f64;
        let col = ((u * n).floor() as usize).min(self.cols - 1);
        let row = ((v * n).floor() as usize).min(self.cols - 1);
        let tile = if self.corners == 4 { 0 } else { row * self.cols + col };
        if self.corners != 4 && tile >= self.corners {
            return None;
        }
        Some((tile, u * n - col as f64, v * n - row as f64))
    }

    /// Derivative scale from tile-local to base parameters.
    pub fn scale(&self) -> f64 {
        self.cols as f64
    }
}

/// One level of a Catmull-Clark refinement hierarchy.
#[derive(Debug, Clone)]
pub struct TopologyLevel {
    pub points: Vec<Point3d>,
    pub face_offsets: Vec<usize>,
    pub face_vertices: Vec<usize>,
    pub params: Vec<PatchParam>,
}

impl TopologyLevel {
    pub fn from_cage(cage: &ControlCage) -> Self {
        let mut face_offsets = Vec::with_capacity(cage.faces.len() + 1);
        let mut face_vertices = Vec::new();
        face_offsets.push(0);
        for face in &cage.faces {
            face_vertices.extend_from_slice(face);
            face_offsets.push(face_vertices.len());
        }
        Self {
            points: cage.vertices.clone(),
            face_offsets,
            face_vertices,
            params: (0..cage.faces.len()).map(PatchParam::base).collect(),
        }
    }

    pub fn face_count(&self) -> usize {
        self.face_offsets.len() - 1
    }

    pub fn face(&self, f: usize) -> &[usize] {
        &self.face_vertices[self.face_offsets[f]..self.face_offsets[f + 1]]
    }

    pub fn face_points(&self, f: usize) -> Vec<Point3d> {
        self.face(f).iter().map(|&v| self.points[v]).collect()
    }
}

/// Boundary classification of a vertex, following the edge-and-corner
/// boundary interpolation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    /// Every incident edge has two faces.
    Interior,
    /// On the boundary with exactly two boundary edges and two or more faces.
    Boundary { prev: usize, next: usize },
    /// On the boundary with a single incident face; interpolated.
    Corner,
    /// Isolated, non-manifold or otherwise unclassifiable; held fixed.
    Fixed,
}

/// Undirected edge/face adjacency of a level. Orientation-agnostic, so cages
/// with inconsistent winding refine the same way as consistent ones.
#[derive(Debug, Clone)]
pub struct LevelAdjacency {
    pub edges: Vec<[usize; 2]>,
    pub edge_lookup: HashMap<(usize, usize), usize>,
    pub edge_faces: Vec<Vec<usize>>,
    /// Parallel to `face_vertices`: edge from corner k to corner k + 1.
    pub face_edges: Vec<usize>,
    pub vertex_faces: Vec<Vec<usize>>,
    pub vertex_edges: Vec<Vec<usize>>,
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}

impl LevelAdjacency {
    pub fn build(level: &TopologyLevel) -> Self {
        let n_verts = level.points.len();
        let mut edges = Vec::new();
        let mut edge_lookup = HashMap::new();
        let mut edge_faces: Vec<Vec<usize>> = Vec::new();
        let mut face_edges = Vec::with_capacity(level.face_vertices.len());
        let mut vertex_faces = vec![Vec::new(); n_verts];
        let mut vertex_edges = vec![Vec::new(); n_verts];

        for f in 0..level.face_count() {
            let face = level.face(f);
            let n = face.len();
            for k in 0..n {
                let (a, b) = (face[k], face[(k + 1) % n]);
                let key = edge_key(a, b);
                let e = *edge_lookup.entry(key).or_insert_with(|| {
                    edges.push([key.0, key.1]);
                    edge_faces.push(Vec::new());
                    vertex_edges[key.0].push(edges.len() - 1);
                    vertex_edges[key.1].push(edges.len() - 1);
                    edges.len() - 1
                });
                edge_faces[e].push(f);
                face_edges.push(e);
                vertex_faces[a].push(f);
            }
        }

        Self {
            edges,
            edge_lookup,
            edge_faces,
            face_edges,
            vertex_faces,
            vertex_edges,
        }
    }

    pub fn edge_between(&self, a: usize, b: usize) -> Option<usize> {
        self.edge_lookup.get(&edge_key(a, b)).copied()
    }

    /// The face other than `face` sharing edge (a, b), if exactly one exists.
    pub fn opposite_face(&self, a: usize, b: usize, face: usize) -> Option<usize> {
        let e = self.edge_between(a, b)?;
        let faces = &self.edge_faces[e];
        if faces.len() != 2 {
            return None;
        }
        faces.iter().copied().find(|&f| f != face)
    }

    pub fn vertex_kind(&self, v: usize) -> VertexKind {
        let incident = &self.vertex_edges[v];
        if incident.is_empty() {
            return VertexKind::Fixed;
        }
        if incident.iter().any(|&e| self.edge_faces[e].len() > 2) {
            return VertexKind::Fixed;
        }
        let boundary: Vec<usize> = incident
            .iter()
            .copied()
            .filter(|&e| self.edge_faces[e].len() == 1)
            .collect();
        match boundary.len() {
            0 => VertexKind::Interior,
            2 => {
                if self.vertex_faces[v].len() == 1 {
                    VertexKind::Corner
                } else {
                    let other = |e: usize| {
                        let [a, b] = self.edges[e];
                        if a == v { b } else { a }
                    };
                    VertexKind::Boundary {
                        prev: other(boundary[0]),
                        next: other(boundary[1]),
                    }
                }
            }
            _ => VertexKind::Fixed,
        }
    }
}

/// Apply one Catmull-Clark step. Child points are laid out as
/// `[vertex points | edge points | face points]`. Children of a quad keep the
/// parent's orientation so their parameter squares tile the parent's square;
/// children of any other face start a new corner tile each.
pub fn refine(level: &TopologyLevel, adjacency: &LevelAdjacency) -> TopologyLevel {
    let n_verts = level.points.len();
    let n_edges = adjacency.edges.len();
    let n_faces = level.face_count();

    let face_points: Vec<Point3d> = (0..n_faces).map(|f| Point3d::centroid(&level.face_points(f))).collect();

    let edge_points: Vec<Point3d> = adjacency
        .edges
        .iter()
        .zip(&adjacency.edge_faces)
        .map(|(&[a, b], faces)| {
            let (pa, pb) = (level.points[a], level.points[b]);
            if faces.len() == 2 {
                Point3d::centroid(&[pa, pb, face_points[faces[0]], face_points[faces[1]]])
            } else {
                pa.midpoint(&pb)
            }
        })
        .collect();

    let vertex_points: Vec<Point3d> = (0..n_verts)
        .map(|v| {
            let p = level.points[v];
            match adjacency.vertex_kind(v) {
                VertexKind::Interior => {
                    let faces = &adjacency.vertex_faces[v];
                    let edges = &adjacency.vertex_edges[v];
                    let n = edges.len() as f64;
                    let q = faces.iter().fold(Vec3::ZERO, |acc, &f| acc + face_points[f].to_vec3()) / faces.len() as f64;
                    let r = edges.iter().fold(Vec3::ZERO, |acc, &e| {
                        let [a, b] = adjacency.edges[e];
                        acc + level.points[a].midpoint(&level.points[b]).to_vec3()
                    }) / n;
                    Point3d::from_vec3((q + r * 2.0 + p.to_vec3() * (n - 3.0)) / n)
                }
                VertexKind::Boundary { prev, next } => {
                    Point3d::weighted_sum(&[level.points[prev], p, level.points[next]], &[0.125, 0.75, 0.125])
                }
                VertexKind::Corner | VertexKind::Fixed => p,
            }
        })
        .collect();

    let mut points = Vec::with_capacity(n_verts + n_edges + n_faces);
    points.extend(vertex_points);
    points.extend(edge_points);
    points.extend(face_points);

    let edge_base = n_verts;
    let face_base = n_verts + n_edges;

    let mut face_offsets = vec![0];
    let mut face_vertices = Vec::with_capacity(level.face_vertices.len() * 4);
    let mut params = Vec::with_capacity(level.face_vertices.len());

    for f in 0..n_faces {
        let face = level.face(f);
        let n = face.len();
        let start = level.face_offsets[f];
        let parent = level.params[f];
        for k in 0..n {
            let e_next = adjacency.face_edges[start + k];
            let e_prev = adjacency.face_edges[start + (k + n - 1) % n];
            let child = [face[k], edge_base + e_next, face_base + f, edge_base + e_prev];
            if n == 4 {
                let shift = (4 - k) % 4;
                for i in 0..4 {
                    face_vertices.push(child[(shift + i) % 4]);
                }
                let half = parent.size * 0.5;
                let (du, dv) = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)][k];
                params.push(PatchParam {
                    base_face: parent.base_face,
                    tile: parent.tile,
                    u0: parent.u0 + du * half,
                    v0: parent.v0 + dv * half,
                    size: half,
                    depth: parent.depth + 1,
                });
            } else {
                face_vertices.extend_from_slice(&child);
                params.push(PatchParam {
                    base_face: parent.base_face,
                    tile: k,
                    u0: 0.0,
                    v0: 0.0,
                    size: 1.0,
                    depth: parent.depth + 1,
                });
            }
            face_offsets.push(face_vertices.len());
        }
    }

    TopologyLevel {
        points,
        face_offsets,
        face_vertices,
        params,
    }
}

/// Exact limit position of a vertex of an all-quad level.
///
/// Interior vertices use the Catmull-Clark limit mask
/// `(n² P + 4 Σ e_i + Σ f_i) / (n (n + 5))`; boundary vertices follow the cubic
/// B-spline boundary curve `(a + 4 P + b) / 6`; corners and fixed vertices are
/// interpolated.
pub fn limit_position(level: &TopologyLevel, adjacency: &LevelAdjacency, v: usize) -> Point3d {
    let p = level.points[v];
    match adjacency.vertex_kind(v) {
        VertexKind::Interior => {
            let faces = &adjacency.vertex_faces[v];
            if faces.iter().any(|&f| level.face(f).len() != 4) {
                return p;
            }
            let n = adjacency.vertex_edges[v].len() as f64;
            let mut edge_sum = Vec3::ZERO;
            for &e in &adjacency.vertex_edges[v] {
                let [a, b] = adjacency.edges[e];
                edge_sum += level.points[if a == v { b } else { a }].to_vec3();
            }
            let mut diagonal_sum = Vec3::ZERO;
            for &f in faces {
                let face = level.face(f);
                if let Some(k) = face.iter().position(|&x| x == v) {
                    diagonal_sum += level.points[face[(k + 2) % 4]].to_vec3();
                }
            }
            let total = p.to_vec3() * (n * n) + edge_sum * 4.0 + diagonal_sum;
            Point3d::from_vec3(total / (n * (n + 5.0)))
        }
        VertexKind::Boundary { prev, next } => {
            Point3d::weighted_sum(&[level.points[prev], p, level.points[next]], &[1.0 / 6.0, 4.0 / 6.0, 1.0 / 6.0])
        }
        VertexKind::Corner | VertexKind::Fixed => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> ControlCage {
        ControlCage::new(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(1.0, 1.0, 0.0),
                Point3d::new(0.0, 1.0, 0.0),
                Point3d::new(0.0, 0.0, 1.0),
                Point3d::new(1.0, 0.0, 1.0),
                Point3d::new(1.0, 1.0, 1.0),
                Point3d::new(0.0, 1.0, 1.0),
            ],
            vec![
                vec![0, 1, 2, 3],
                vec![4, 5, 6, 7],
                vec![0, 1, 5, 4],
                vec![2, 3, 7, 6],
                vec![0, 3, 7, 4],
                vec![1, 2, 6, 5],
            ],
        )
    }

    #[test]
    fn test_cube_adjacency_counts() {
        let level = TopologyLevel::from_cage(&cube());
        let adj = LevelAdjacency::build(&level);
        assert_eq!(adj.edges.len(), 12);
        assert!(adj.edge_faces.iter().all(|f| f.len() == 2));
        assert!((0..8).all(|v| adj.vertex_kind(v) == VertexKind::Interior));
        assert!((0..8).all(|v| adj.vertex_edges[v].len() == 3));
    }

    #[test]
    fn test_cube_refinement_counts_and_vertex_point() {
        let level = TopologyLevel::from_cage(&cube());
        let adj = LevelAdjacency::build(&level);
        let next = refine(&level, &adj);
        assert_eq!(next.face_count(), 24);
        assert_eq!(next.points.len(), 8 + 12 + 6);
        // Valence-3 corner of the unit cube moves to (2/9, 2/9, 2/9).
        let p0 = next.points[0];
        assert!(p0.distance_to(&Point3d::new(2.0 / 9.0, 2.0 / 9.0, 2.0 / 9.0)) < 1e-12);
    }

    #[test]
    fn test_quad_children_tile_parent_square() {
        let level = TopologyLevel::from_cage(&cube());
        let adj = LevelAdjacency::build(&level);
        let next = refine(&level, &adj);
        let mut covered: Vec<(f64, f64)> = next
            .params
            .iter()
            .filter(|p| p.base_face == 0)
            .map(|p| (p.u0, p.v0))
            .collect();
        covered.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(covered, vec![(0.0, 0.0), (0.0, 0.5), (0.5, 0.0), (0.5, 0.5)]);

        // The child anchored at (0.5, 0) starts at the midpoint of edge 0-1.
        let child = next.params.iter().position(|p| p.base_face == 0 && p.u0 == 0.5 && p.v0 == 0.0).unwrap();
        let first = next.points[next.face(child)[0]];
        let e01 = next.points[8 + adj.edge_between(0, 1).unwrap()];
        assert!(first.distance_to(&e01) < 1e-12);
    }

    #[test]
    fn test_open_quad_boundary_rules() {
        let cage = ControlCage::new(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(2.0, 0.0, 0.0),
                Point3d::new(2.0, 2.0, 0.0),
                Point3d::new(0.0, 2.0, 0.0),
            ],
            vec![vec![0, 1, 2, 3]],
        );
        let level = TopologyLevel::from_cage(&cage);
        let adj = LevelAdjacency::build(&level);
        assert_eq!(adj.vertex_kind(0), VertexKind::Corner);
        let next = refine(&level, &adj);
        // Corners are interpolated, boundary edges split at their midpoints.
        assert_eq!(next.points[0], cage.vertices[0]);
        let e01 = next.points[4 + adj.edge_between(0, 1).unwrap()];
        assert!(e01.distance_to(&Point3d::new(1.0, 0.0, 0.0)) < 1e-12);
    }

    #[test]
    fn test_triangle_tiles() {
        let layout = TileLayout::for_face(3);
        assert_eq!(layout.cols, 2);
        assert_eq!(layout.locate(0.25, 0.25).map(|t| t.0), Some(0));
        assert_eq!(layout.locate(0.75, 0.25).map(|t| t.0), Some(1));
        assert_eq!(layout.locate(0.25, 0.75).map(|t| t.0), Some(2));
        assert!(layout.locate(0.75, 0.75).is_none());
        let (tile, ut, vt) = layout.locate(1.0, 0.0).unwrap();
        assert_eq!(tile, 1);
        assert!((ut - 1.0).abs() < 1e-12 && vt.abs() < 1e-12);
    }

    #[test]
    fn test_limit_position_of_regular_plane_vertex() {
        // A flat 3x3 grid of quads: the centre vertex limit stays in place.
        let mut vertices = Vec::new();
        for j in 0..4 {
            for i in 0..4 {
                vertices.push(Point3d::new(i as f64, j as f64, 0.0));
            }
        }
        let mut faces = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                let a = j * 4 + i;
                faces.push(vec![a, a + 1, a + 5, a + 4]);
            }
        }
        let level = TopologyLevel::from_cage(&ControlCage::new(vertices, faces));
        let adj = LevelAdjacency::build(&level);
        let p = limit_position(&level, &adj, 5);
        assert!(p.distance_to(&Point3d::new(1.0, 1.0, 0.0)) < 1e-12);
        // Boundary vertex on a straight edge also stays put.
        let b = limit_position(&level, &adj, 1);
        assert!(b.distance_to(&Point3d::new(1.0, 0.0, 0.0)) < 1e-12);
    }
}
