//! Feature-adaptive patch table for exact limit-surface evaluation.
//!
//! Regular quads (all four corners regular) are represented exactly as
//! uniform bicubic B-spline patches over their 16-point one-ring. Faces with
//! an extraordinary corner are refined until either their sub-faces become
//! regular or the isolation level is reached, where the remaining irregular
//! sub-faces are closed with bilinear caps through exact limit positions.

use tracing::{debug, info, instrument};

use crate::error::{MoldError, Result};
use crate::geometry::nurbs::SurfaceDerivatives;
use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;

use super::cage::ControlCage;
use super::refiner::{LevelAdjacency, PatchParam, TileLayout, TopologyLevel, VertexKind, limit_position, refine};

const LOOKUP_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchType {
    Regular,
    BilinearEndCap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchPoints {
    /// Row-major 4x4 B-spline control grid, `grid[row * 4 + col]`, rows
    /// along v.
    Regular([Point3d; 16]),
    /// Limit positions at local (0,0), (1,0), (1,1), (0,1).
    BilinearEndCap([Point3d; 4]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub param: PatchParam,
    pub points: PatchPoints,
}

impl Patch {
    pub fn patch_type(&self) -> PatchType {
        match self.points {
            PatchPoints::Regular(_) => PatchType::Regular,
            PatchPoints::BilinearEndCap(_) => PatchType::BilinearEndCap,
        }
    }

    /// Evaluate in the patch's own unit square; derivatives are with respect
    /// to the local coordinates.
    pub fn evaluate_local(&self, s: f64, t: f64) -> SurfaceDerivatives {
        match &self.points {
            PatchPoints::Regular(grid) => evaluate_bicubic(grid, s, t),
            PatchPoints::BilinearEndCap(q) => evaluate_bilinear(q, s, t),
        }
    }
}

/// Uniform cubic B-spline basis values and first/second derivatives.
fn cubic_basis(s: f64) -> ([f64; 4], [f64; 4], [f64; 4]) {
    let r = 1.0 - s;
    let s2 = s * s;
    let s3 = s2 * s;
    let b = [
        r * r * r / 6.0,
        (3.0 * s3 - 6.0 * s2 + 4.0) / 6.0,
        (-3.0 * s3 + 3.0 * s2 + 3.0 * s + 1.0) / 6.0,
        s3 / 6.0,
    ];
    let d = [
        -r * r / 2.0,
        (3.0 * s2 - 4.0 * s) / 2.0,
        (-3.0 * s2 + 2.0 * s + 1.0) / 2.0,
        s2 / 2.0,
    ];
    let dd = [r, 3.0 * s - 2.0, -3.0 * s + 1.0, s];
    (b, d, dd)
}

fn evaluate_bicubic(grid: &[Point3d; 16], s: f64, t: f64) -> SurfaceDerivatives {
    let (bu, du, duu) = cubic_basis(s);
    let (bv, dv, dvv) = cubic_basis(t);
    let mut out = [Vec3::ZERO; 6];
    for row in 0..4 {
        for col in 0..4 {
            let p = grid[row * 4 + col].to_vec3();
            out[0] += p * (bu[col] * bv[row]);
            out[1] += p * (du[col] * bv[row]);
            out[2] += p * (bu[col] * dv[row]);
            out[3] += p * (duu[col] * bv[row]);
            out[4] += p * (bu[col] * dvv[row]);
            out[5] += p * (du[col] * dv[row]);
        }
    }
    SurfaceDerivatives {
        point: Point3d::from_vec3(out[0]),
        du: out[1],
        dv: out[2],
        duu: out[3],
        dvv: out[4],
        duv: out[5],
    }
}

fn evaluate_bilinear(q: &[Point3d; 4], s: f64, t: f64) -> SurfaceDerivatives {
    let point = Point3d::weighted_sum(q, &[(1.0 - s) * (1.0 - t), s * (1.0 - t), s * t, (1.0 - s) * t]);
    let du = (q[1] - q[0]) * (1.0 - t) + (q[2] - q[3]) * t;
    let dv = (q[3] - q[0]) * (1.0 - s) + (q[2] - q[1]) * s;
    let duv = (q[0] - q[1]) + (q[2] - q[3]);
    SurfaceDerivatives {
        point,
        du,
        dv,
        duu: Vec3::ZERO,
        dvv: Vec3::ZERO,
        duv,
    }
}

/// In quad `g`, the neighbour of `g[m]` other than `known`, and the vertex
/// diagonally opposite `g[m]`.
fn quad_other_and_opposite(g: &[usize], v: usize, known: usize) -> Option<(usize, usize)> {
    if g.len() != 4 {
        return None;
    }
    let m = g.iter().position(|&x| x == v)?;
    let next = g[(m + 1) % 4];
    let prev = g[(m + 3) % 4];
    let other = if next == known {
        prev
    } else if prev == known {
        next
    } else {
        return None;
    };
    Some((other, g[(m + 2) % 4]))
}

/// Grid slot of corner `k` of the face (0 -> (1,1), 1 -> (2,1), 2 -> (2,2),
/// 3 -> (1,2)) as signed (col, row).
const CORNER_SLOTS: [(i32, i32); 4] = [(1, 1), (2, 1), (2, 2), (1, 2)];

/// Gather the 16 control points of a regular quad, extrapolating phantom
/// points across boundary edges. `None` when any corner is irregular.
fn regular_grid(level: &TopologyLevel, adjacency: &LevelAdjacency, f: usize) -> Option<[Point3d; 16]> {
    let c = level.face(f);
    if c.len() != 4 {
        return None;
    }
    let pts = &level.points;
    let mut grid = [Point3d::ORIGIN; 16];
    let mut put = |(col, row): (i32, i32), p: Point3d| {
        grid[row as usize * 4 + col as usize] = p;
    };

    for k in 0..4 {
        let ck = c[k];
        let next = c[(k + 1) % 4];
        let prev = c[(k + 3) % 4];
        let diag = c[(k + 2) % 4];
        let slot = CORNER_SLOTS[k];
        let a = (CORNER_SLOTS[(k + 1) % 4].0 - slot.0, CORNER_SLOTS[(k + 1) % 4].1 - slot.1);
        let b = (CORNER_SLOTS[(k + 3) % 4].0 - slot.0, CORNER_SLOTS[(k + 3) % 4].1 - slot.1);
        put(slot, pts[ck]);

        let f1 = adjacency.opposite_face(ck, prev, f);
        let f3 = adjacency.opposite_face(ck, next, f);
        let face_count = adjacency.vertex_faces[ck].len();

        let pk = pts[ck].to_vec3();
        let (xa, xb, xab) = match (f1, f3) {
            (Some(f1), Some(f3)) => {
                if adjacency.vertex_kind(ck) != VertexKind::Interior
                    || face_count != 4
                    || adjacency.vertex_edges[ck].len() != 4
                {
                    return None;
                }
                let (xa, _) = quad_other_and_opposite(level.face(f1), ck, prev)?;
                let (xb, _) = quad_other_and_opposite(level.face(f3), ck, next)?;
                let f2 = adjacency.opposite_face(ck, xa, f1)?;
                if f2 == f || f2 == f3 {
                    return None;
                }
                let (x2, xab) = quad_other_and_opposite(level.face(f2), ck, xa)?;
                if x2 != xb {
                    return None;
                }
                (pts[xa], pts[xb], pts[xab])
            }
            (None, Some(f3)) => {
                if face_count != 2 {
                    return None;
                }
                let (xb, y3) = quad_other_and_opposite(level.face(f3), ck, next)?;
                let xa = pk * 2.0 - pts[next].to_vec3();
                let xab = pts[xb].to_vec3() * 2.0 - pts[y3].to_vec3();
                (Point3d::from_vec3(xa), pts[xb], Point3d::from_vec3(xab))
            }
            (Some(f1), None) => {
                if face_count != 2 {
                    return None;
                }
                let (xa, y1) = quad_other_and_opposite(level.face(f1), ck, prev)?;
                let xb = pk * 2.0 - pts[prev].to_vec3();
                let xab = pts[xa].to_vec3() * 2.0 - pts[y1].to_vec3();
                (pts[xa], Point3d::from_vec3(xb), Point3d::from_vec3(xab))
            }
            (None, None) => {
                if face_count != 1 {
                    return None;
                }
                let pn = pts[next].to_vec3();
                let pp = pts[prev].to_vec3();
                let xa = pk * 2.0 - pn;
                let xb = pk * 2.0 - pp;
                let xab = pk * 4.0 - pn * 2.0 - pp * 2.0 + pts[diag].to_vec3();
                (Point3d::from_vec3(xa), Point3d::from_vec3(xb), Point3d::from_vec3(xab))
            }
        };

        put((slot.0 - a.0, slot.1 - a.1), xa);
        put((slot.0 - b.0, slot.1 - b.1), xb);
        put((slot.0 - a.0 - b.0, slot.1 - a.1 - b.1), xab);
    }
    Some(grid)
}

fn end_cap(level: &TopologyLevel, adjacency: &LevelAdjacency, f: usize) -> Option<[Point3d; 4]> {
    let c = level.face(f);
    if c.len() != 4 {
        return None;
    }
    Some([
        limit_position(level, adjacency, c[0]),
        limit_position(level, adjacency, c[1]),
        limit_position(level, adjacency, c[2]),
        limit_position(level, adjacency, c[3]),
    ])
}

/// All patches covering the limit surface, grouped by base face.
#[derive(Debug, Clone)]
pub struct PatchTable {
    patches: Vec<Patch>,
    face_patches: Vec<Vec<usize>>,
    layouts: Vec<TileLayout>,
    max_depth: usize,
}

impl PatchTable {
    /// Build the table, refining around extraordinary features up to
    /// `isolation_level` (at least 1).
    #[instrument(skip(cage), fields(faces = cage.faces.len()))]
    pub fn build(cage: &ControlCage, isolation_level: usize) -> Result<Self> {
        let isolation_level = isolation_level.max(1);
        let base_faces = cage.faces.len();
        let layouts: Vec<TileLayout> = cage.faces.iter().map(|f| TileLayout::for_face(f.len())).collect();

        let mut patches = Vec::new();
        let mut face_patches = vec![Vec::new(); base_faces];
        let mut level = TopologyLevel::from_cage(cage);
        let mut active = vec![true; base_faces];
        let mut max_depth = 0;

        for depth in 0..=isolation_level {
            let adjacency = LevelAdjacency::build(&level);
            let mut child_active = vec![false; level.face_vertices.len()];
            let mut any_child = false;

            for f in (0..level.face_count()).filter(|&f| active[f]) {
                let param = level.params[f];
                let points = if let Some(grid) = regular_grid(&level, &adjacency, f) {
                    Some(PatchPoints::Regular(grid))
                } else if depth == isolation_level {
                    let corners = end_cap(&level, &adjacency, f).ok_or_else(|| {
                        MoldError::Internal(format!("non-quad face {f} at isolation level {depth}"))
                    })?;
                    Some(PatchPoints::BilinearEndCap(corners))
                } else {
                    None
                };

                match points {
                    Some(points) => {
                        face_patches[param.base_face].push(patches.len());
                        patches.push(Patch { param, points });
                        max_depth = max_depth.max(depth);
                    }
                    None => {
                        // Children of face f occupy the same slots as its corners.
                        for child in level.face_offsets[f]..level.face_offsets[f + 1] {
                            child_active[child] = true;
                        }
                        any_child = true;
                    }
                }
            }

            debug!(depth, faces = level.face_count(), patches = patches.len(), "patch table level");
            if !any_child {
                break;
            }
            level = refine(&level, &adjacency);
            active = child_active;
        }

        let table = Self {
            patches,
            face_patches,
            layouts,
            max_depth,
        };
        info!(
            patches = table.patches.len(),
            regular = table.count(PatchType::Regular),
            end_caps = table.count(PatchType::BilinearEndCap),
            max_depth,
            "patch table built"
        );
        Ok(table)
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn patches_for_face(&self, face: usize) -> impl Iterator<Item = &Patch> {
        self.face_patches
            .get(face)
            .into_iter()
            .flat_map(|ids| ids.iter().map(|&i| &self.patches[i]))
    }

    pub fn count(&self, kind: PatchType) -> usize {
        self.patches.iter().filter(|p| p.patch_type() == kind).count()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn face_count(&self) -> usize {
        self.face_patches.len()
    }

    /// Evaluate the limit surface of base `face` at (u, v) with derivatives
    /// taken with respect to the base face's (u, v).
    pub fn evaluate(&self, face: usize, u: f64, v: f64) -> Result<SurfaceDerivatives> {
        let lookup_err = || MoldError::PatchLookup { face, u, v };
        let layout = self.layouts.get(face).ok_or_else(lookup_err)?;
        let (tile, ut, vt) = layout.locate(u, v).ok_or_else(lookup_err)?;
        let patch = self
            .patches_for_face(face)
            .find(|p| p.param.tile == tile && p.param.contains(ut, vt, LOOKUP_EPS))
            .ok_or_else(lookup_err)?;

        let (s, t) = patch.param.normalize(ut, vt);
        let local = patch.evaluate_local(s, t);
        let scale = layout.scale() / patch.param.size;
        let scale2 = scale * scale;
        Ok(SurfaceDerivatives {
            point: local.point,
            du: local.du * scale,
            dv: local.dv * scale,
            duu: local.duu * scale2,
            dvv: local.dvv * scale2,
            duv: local.duv * scale2,
        })
    }
}
