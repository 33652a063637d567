//! Thickening of fitted patches into closed, manufacturable solids.
//!
//! The patch is sampled on a regular grid and offset along its unit normal.
//! Front grid, offset grid and the ruled side walls between their borders
//! are triangulated into a single closed shell, which must pass the full
//! B-rep validation before it is handed out.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::boolean::{BooleanEngine, MeshBooleanEngine};
use crate::error::{MoldError, Result};
use crate::geometry::bounds::BoundingBox;
use crate::geometry::nurbs::{RationalSurfacePatch, SurfaceDerivatives};
use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;
use crate::topology::brep::{EntityStore, SolidId};
use crate::topology::primitives::{make_cylinder, make_polyhedron};
use crate::validation::{BRepValidator, ValidationConfig, ValidationReport};

/// Which side of the patch the wall grows towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WallSide {
    /// Away from the centre of mean curvature; along the normal when flat.
    #[default]
    Auto,
    /// Along the patch normal `du × dv`.
    Front,
    /// Against the patch normal.
    Back,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolidConfig {
    /// Grid spans per parametric direction.
    pub resolution: usize,
    pub wall_side: WallSide,
}

impl Default for SolidConfig {
    fn default() -> Self {
        Self {
            resolution: 16,
            wall_side: WallSide::Auto,
        }
    }
}

/// Registration key geometry: a faceted cylinder along +Z.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeyConfig {
    pub radius: f64,
    pub height: f64,
    pub segments: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            radius: 5.0,
            height: 10.0,
            segments: 32,
        }
    }
}

/// A validated closed solid together with the store that owns it.
#[derive(Debug, Clone)]
pub struct ManufacturableSolid {
    pub store: EntityStore,
    pub solid_id: SolidId,
    /// Report of the validation the solid last passed.
    pub report: ValidationReport,
}

impl ManufacturableSolid {
    pub fn volume(&self) -> f64 {
        crate::validation::volume::signed_volume(&self.store, self.solid_id)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.store.solid_bounding_box(self.solid_id)
    }

    pub fn face_count(&self) -> usize {
        self.store.solid_faces(self.solid_id).len()
    }

    pub fn shell_count(&self) -> usize {
        self.store.solids[self.solid_id].shells.len()
    }
}

/// Builds mold walls from patches and fuses registration keys onto them.
#[derive(Debug, Clone)]
pub struct SolidSynthesizer<E: BooleanEngine = MeshBooleanEngine> {
    config: SolidConfig,
    keys: KeyConfig,
    engine: E,
    validation: ValidationConfig,
}

impl Default for SolidSynthesizer<MeshBooleanEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl SolidSynthesizer<MeshBooleanEngine> {
    pub fn new() -> Self {
        Self::with_engine(MeshBooleanEngine::default())
    }
}

impl<E: BooleanEngine> SolidSynthesizer<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            config: SolidConfig::default(),
            keys: KeyConfig::default(),
            engine,
            validation: ValidationConfig::geometry(),
        }
    }

    pub fn with_config(mut self, config: SolidConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_key_config(mut self, keys: KeyConfig) -> Self {
        self.keys = keys;
        self
    }

    pub fn config(&self) -> &SolidConfig {
        &self.config
    }

    pub fn key_config(&self) -> &KeyConfig {
        &self.keys
    }

    /// Thicken `patch` into a closed solid `wall_thickness` deep.
    #[instrument(skip(self, patch), fields(resolution = self.config.resolution))]
    pub fn create_solid(&self, patch: &RationalSurfacePatch, wall_thickness: f64) -> Result<ManufacturableSolid> {
        if !wall_thickness.is_finite() || wall_thickness <= 0.0 {
            return Err(MoldError::InvalidParameter(format!(
                "wall thickness must be positive, got {wall_thickness}"
            )));
        }
        if self.config.resolution == 0 {
            return Err(MoldError::InvalidParameter("solid resolution must be at least 1".into()));
        }
        patch.validate()?;

        let grid = SampleGrid::sample(patch, self.config.resolution)?;
        let side = match self.config.wall_side {
            WallSide::Front => 1.0,
            WallSide::Back => -1.0,
            WallSide::Auto => grid.convex_side(),
        };
        let distance = side * wall_thickness;
        grid.check_within_curvature(distance)?;
        let offset = grid.offset(distance);
        grid.check_not_folded(&offset)?;

        let (points, faces) = grid.shell(&offset, side);
        let mut store = EntityStore::new();
        let solid_id = make_polyhedron(&mut store, &points, &faces)?;
        let report = self.validate(&store, solid_id)?;

        info!(
            faces = faces.len(),
            side,
            volume = report.metrics.volume.unwrap_or_default(),
            "solid created"
        );
        Ok(ManufacturableSolid {
            store,
            solid_id,
            report,
        })
    }

    /// Fuse one cylindrical key per position onto `solid`, re-validating
    /// after every union. Without positions the solid comes back unchanged.
    #[instrument(skip(self, solid, positions), fields(keys = positions.len()))]
    pub fn add_registration_keys(
        &self,
        solid: ManufacturableSolid,
        positions: &[Point3d],
    ) -> Result<ManufacturableSolid> {
        if positions.is_empty() {
            return Ok(solid);
        }
        let KeyConfig {
            radius,
            height,
            segments,
        } = self.keys;
        if !(radius.is_finite() && radius > 0.0 && height.is_finite() && height > 0.0) || segments < 3 {
            return Err(MoldError::InvalidParameter(format!(
                "key needs positive radius and height and at least 3 segments, got r={radius} h={height} n={segments}"
            )));
        }
        if let Some(p) = positions.iter().find(|p| !p.is_finite()) {
            return Err(MoldError::InvalidParameter(format!("key position {p:?} is not finite")));
        }

        let ManufacturableSolid {
            mut store,
            mut solid_id,
            mut report,
        } = solid;
        for (i, &position) in positions.iter().enumerate() {
            let key = make_cylinder(&mut store, position, radius, height, segments)?;
            solid_id = self.engine.union(&mut store, solid_id, key)?;
            store.retain_solid(solid_id);
            report = self.validate(&store, solid_id).map_err(|e| match e {
                MoldError::InvalidSolid(msg) => MoldError::InvalidSolid(format!("after key {i}: {msg}")),
                other => other,
            })?;
            debug!(key = i, faces = report.metrics.entity_counts.faces, "key fused");
        }

        info!(keys = positions.len(), "registration keys added");
        Ok(ManufacturableSolid {
            store,
            solid_id,
            report,
        })
    }

    fn validate(&self, store: &EntityStore, solid_id: SolidId) -> Result<ValidationReport> {
        let report = BRepValidator::new(self.validation.clone()).validate(store, solid_id);
        if report.valid {
            Ok(report)
        } else {
            Err(MoldError::InvalidSolid(report.to_string()))
        }
    }
}

/// Patch positions and unit normals on an `(n+1) × (n+1)` grid, row `i`
/// along u.
struct SampleGrid {
    n: usize,
    points: Vec<Point3d>,
    normals: Vec<Vec3>,
    /// Sum of mean curvature over the samples, signed against the normal.
    mean_curvature: f64,
    /// Smallest and largest principal curvature seen.
    curvature_range: (f64, f64),
    extent: f64,
}

impl SampleGrid {
    fn sample(patch: &RationalSurfacePatch, n: usize) -> Result<Self> {
        let (u0, u1) = patch.domain_u();
        let (v0, v1) = patch.domain_v();
        let side = n + 1;
        let mut points = Vec::with_capacity(side * side);
        let mut normals = Vec::with_capacity(side * side);
        let mut mean_curvature = 0.0;
        let mut curvature_range = (0.0f64, 0.0f64);

        for i in 0..side {
            let u = u0 + (u1 - u0) * i as f64 / n as f64;
            for j in 0..side {
                let v = v0 + (v1 - v0) * j as f64 / n as f64;
                let d = patch.derivatives(u, v);
                if !d.point.is_finite() {
                    return Err(MoldError::InvalidInput(format!("patch is not finite at ({u}, {v})")));
                }
                points.push(d.point);
                normals.push(d.normal());
                if let Some((k1, k2)) = principal_curvatures(&d) {
                    mean_curvature += 0.5 * (k1 + k2);
                    curvature_range = (curvature_range.0.min(k1).min(k2), curvature_range.1.max(k1).max(k2));
                }
            }
        }

        let extent = BoundingBox::from_points(&points).diagonal();
        let normals = fill_missing_normals(&points, normals, side)?;
        Ok(Self {
            n,
            points,
            normals,
            mean_curvature,
            curvature_range,
            extent,
        })
    }

    fn index(&self, i: usize, j: usize) -> usize {
        i * (self.n + 1) + j
    }

    /// +1 to grow along the normal, -1 against it. Mean curvature is
    /// negative when the surface bends away from its normal, which puts the
    /// convex side in front.
    fn convex_side(&self) -> f64 {
        let samples = ((self.n + 1) * (self.n + 1)) as f64;
        let h = self.mean_curvature / samples;
        if (h * self.extent).abs() < 1e-9 || h < 0.0 { 1.0 } else { -1.0 }
    }

    fn offset(&self, distance: f64) -> Vec<Point3d> {
        self.points
            .iter()
            .zip(&self.normals)
            .map(|(&p, &n)| p + n * distance)
            .collect()
    }

    /// Offsetting by `distance` scales each principal direction by
    /// `1 - distance·κ`. A non-positive factor means the wall reaches the
    /// centre of curvature and the offset sheet turns inside out, which the
    /// cell orientation test misses when both directions flip at once.
    fn check_within_curvature(&self, distance: f64) -> Result<()> {
        let (lo, hi) = self.curvature_range;
        let worst = (distance * lo).max(distance * hi);
        if worst >= 1.0 {
            return Err(MoldError::InvalidSolid(format!(
                "wall thickness {} reaches the centre of curvature (smallest radius {:.4})",
                distance.abs(),
                distance.abs() / worst
            )));
        }
        Ok(())
    }

    /// Cell triangles of the offset grid must face the same way as the
    /// source cells; otherwise the wall is thicker than the local radius of
    /// curvature and the offset has turned inside out.
    fn check_not_folded(&self, offset: &[Point3d]) -> Result<()> {
        for (a, b, c) in self.cell_triangles() {
            let source = (self.points[b] - self.points[a]).cross(&(self.points[c] - self.points[a]));
            let moved = (offset[b] - offset[a]).cross(&(offset[c] - offset[a]));
            if source.dot(&moved) <= 0.0 {
                return Err(MoldError::InvalidSolid(format!(
                    "offset surface folds over near sample {a}; wall thickness exceeds the local radius of curvature"
                )));
            }
        }
        Ok(())
    }

    /// Triangles of every grid cell in parametric winding (normal along
    /// `du × dv`).
    fn cell_triangles(&self) -> Vec<(usize, usize, usize)> {
        let mut tris = Vec::with_capacity(2 * self.n * self.n);
        for i in 0..self.n {
            for j in 0..self.n {
                let (p00, p10) = (self.index(i, j), self.index(i + 1, j));
                let (p01, p11) = (self.index(i, j + 1), self.index(i + 1, j + 1));
                tris.push((p00, p10, p11));
                tris.push((p00, p11, p01));
            }
        }
        tris
    }

    /// Closed triangle shell: front grid, offset grid and side walls, wound
    /// outward for a wall grown to `side`.
    fn shell(&self, offset: &[Point3d], side: f64) -> (Vec<Point3d>, Vec<Vec<usize>>) {
        let back = self.points.len();
        let mut points = self.points.clone();
        points.extend_from_slice(offset);

        let mut faces: Vec<Vec<usize>> = Vec::with_capacity(4 * self.n * (self.n + 1));
        let mut front_edges = HashSet::new();
        for (a, b, c) in self.cell_triangles() {
            // The front faces against the growth direction.
            faces.push(vec![a, c, b]);
            front_edges.extend([(a, c), (c, b), (b, a)]);
            faces.push(vec![back + a, back + b, back + c]);
        }

        let mut border: Vec<(usize, usize)> = front_edges
            .iter()
            .copied()
            .filter(|&(a, b)| !front_edges.contains(&(b, a)))
            .collect();
        border.sort_unstable();
        for (a, b) in border {
            faces.push(vec![b, a, back + a]);
            faces.push(vec![b, back + a, back + b]);
        }

        if side < 0.0 {
            faces.iter_mut().for_each(|f| f.reverse());
        }
        (points, faces)
    }
}

/// Principal curvatures `H ± sqrt(H² - K)` from the fundamental forms, with
/// `H = (EN - 2FM + GL) / 2(EG - F²)` and `K = (LN - M²) / (EG - F²)`.
/// Positive where the surface bends towards its normal. `None` where the
/// first fundamental form degenerates.
fn principal_curvatures(d: &SurfaceDerivatives) -> Option<(f64, f64)> {
    let n = d.normal()?;
    let (e, f, g) = (d.du.dot(&d.du), d.du.dot(&d.dv), d.dv.dot(&d.dv));
    let (l, m, nn) = (d.duu.dot(&n), d.duv.dot(&n), d.dvv.dot(&n));
    let det = e * g - f * f;
    if det <= 1e-24 {
        return None;
    }
    let mean = (e * nn - 2.0 * f * m + g * l) / (2.0 * det);
    let gauss = (l * nn - m * m) / det;
    let spread = (mean * mean - gauss).max(0.0).sqrt();
    Some((mean - spread, mean + spread))
}

/// Replace normals lost at degenerate samples by the normal of the
/// neighbouring grid points.
fn fill_missing_normals(points: &[Point3d], normals: Vec<Option<Vec3>>, side: usize) -> Result<Vec<Vec3>> {
    let at = |i: usize, j: usize| points[i * side + j];
    normals
        .iter()
        .enumerate()
        .map(|(k, normal)| {
            if let Some(n) = normal {
                return Ok(*n);
            }
            let (i, j) = (k / side, k % side);
            let (i0, i1) = (i.saturating_sub(1), (i + 1).min(side - 1));
            let (j0, j1) = (j.saturating_sub(1), (j + 1).min(side - 1));
            (at(i1, j) - at(i0, j))
                .cross(&(at(i, j1) - at(i, j0)))
                .normalized()
                .ok_or_else(|| MoldError::InvalidSolid(format!("no surface normal at grid sample ({i}, {j})")))
        })
        .collect()
}
