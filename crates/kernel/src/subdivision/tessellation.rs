use serde::{Deserialize, Serialize};

use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;

use super::cage::ControlCage;
use super::refiner::{LevelAdjacency, TopologyLevel, limit_position, refine};

/// A triangle mesh of the (refined) cage for display and QA.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TessellationResult {
    pub vertices: Vec<Point3d>,
    /// Area-weighted vertex normals, zero for isolated vertices.
    pub normals: Vec<Vec3>,
    pub triangles: Vec<[usize; 3]>,
    /// Base-cage face each triangle was generated from.
    pub face_parents: Vec<usize>,
}

impl TessellationResult {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// Refine `cage` uniformly `level` times and fan-triangulate every face.
/// With `adaptive`, refined vertices are moved onto their limit positions.
pub(crate) fn tessellate_cage(cage: &ControlCage, level: usize, adaptive: bool) -> TessellationResult {
    let mut topo = TopologyLevel::from_cage(cage);
    for _ in 0..level {
        let adjacency = LevelAdjacency::build(&topo);
        topo = refine(&topo, &adjacency);
    }

    let vertices = if adaptive {
        let adjacency = LevelAdjacency::build(&topo);
        (0..topo.points.len()).map(|v| limit_position(&topo, &adjacency, v)).collect()
    } else {
        topo.points.clone()
    };

    let mut triangles = Vec::new();
    let mut face_parents = Vec::new();
    for f in 0..topo.face_count() {
        let face = topo.face(f);
        for k in 1..face.len() - 1 {
            triangles.push([face[0], face[k], face[k + 1]]);
            face_parents.push(topo.params[f].base_face);
        }
    }

    let mut accum = vec![Vec3::ZERO; vertices.len()];
    for tri in &triangles {
        let [a, b, c] = tri.map(|i| vertices[i]);
        // Unnormalized cross product weights by twice the triangle area.
        let n = (b - a).cross(&(c - a));
        for &i in tri {
            accum[i] += n;
        }
    }
    let normals = accum.iter().map(Vec3::normalize_or_zero).collect();

    TessellationResult {
        vertices,
        normals,
        triangles,
        face_parents,
    }
}
