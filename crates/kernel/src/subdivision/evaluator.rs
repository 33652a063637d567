use std::sync::OnceLock;

use tracing::{info, instrument};

use crate::error::{MoldError, Result};
use crate::geometry::nurbs::SurfaceDerivatives;
use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;

use super::cage::ControlCage;
use super::patch_table::PatchTable;
use super::tessellation::{TessellationResult, tessellate_cage};
use super::{EvalTier, EvaluatorConfig, EvaluatorState, LimitSample};

/// Highest uniform refinement level accepted by [`LimitSurfaceEvaluator::tessellate`].
pub const MAX_TESSELLATION_LEVEL: u32 = 10;

/// Below this `|du x dv|` a sample's normal falls back to +Z.
const DEGENERATE_NORMAL: f64 = 1e-8;

/// Evaluates the Catmull-Clark limit surface of one control cage.
///
/// The cage is fixed once [`initialize`](Self::initialize) succeeds. The exact
/// evaluation structure is built on first use and then shared read-only.
#[derive(Debug, Default)]
pub struct LimitSurfaceEvaluator {
    config: EvaluatorConfig,
    cage: Option<ControlCage>,
    patch_table: OnceLock<PatchTable>,
}

impl LimitSurfaceEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EvaluatorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Convenience constructor: `new` followed by `initialize`.
    pub fn from_cage(cage: ControlCage) -> Result<Self> {
        let mut evaluator = Self::new();
        evaluator.initialize(cage)?;
        Ok(evaluator)
    }

    /// Take ownership of a validated cage. A second call is rejected.
    #[instrument(skip(self, cage), fields(vertices = cage.vertices.len(), faces = cage.faces.len()))]
    pub fn initialize(&mut self, cage: ControlCage) -> Result<()> {
        if self.cage.is_some() {
            return Err(MoldError::InvalidInput(
                "evaluator is already initialized; re-initialization is not supported".into(),
            ));
        }
        cage.validate()?;
        if !cage.creases.is_empty() {
            info!(creases = cage.creases.len(), "crease tags recorded but not applied to refinement");
        }
        self.cage = Some(cage);
        info!("evaluator initialized");
        Ok(())
    }

    pub fn state(&self) -> EvaluatorState {
        match (&self.cage, self.patch_table.get()) {
            (None, _) => EvaluatorState::Uninitialized,
            (Some(_), None) => EvaluatorState::Initialized,
            (Some(_), Some(_)) => EvaluatorState::PatchTableBuilt,
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn control_cage(&self) -> Result<&ControlCage> {
        self.cage
            .as_ref()
            .ok_or_else(|| MoldError::NotInitialized("no control cage has been loaded".into()))
    }

    pub fn control_vertex_count(&self) -> Result<usize> {
        Ok(self.control_cage()?.vertex_count())
    }

    pub fn control_face_count(&self) -> Result<usize> {
        Ok(self.control_cage()?.face_count())
    }

    /// Build the patch table if it does not exist yet and return it.
    pub fn ensure_patch_table(&self) -> Result<&PatchTable> {
        let cage = self.control_cage()?;
        if let Some(table) = self.patch_table.get() {
            return Ok(table);
        }
        let table = PatchTable::build(cage, self.config.isolation_level)?;
        // A concurrent builder may have won; both tables are identical.
        let _ = self.patch_table.set(table);
        self.patch_table
            .get()
            .ok_or_else(|| MoldError::Internal("patch table missing after build".into()))
    }

    fn check_query(&self, face: usize, u: f64, v: f64) -> Result<&ControlCage> {
        let cage = self.control_cage()?;
        if face >= cage.face_count() {
            return Err(MoldError::InvalidParameter(format!(
                "face index {face} out of range (cage has {} faces)",
                cage.face_count()
            )));
        }
        let tol = crate::default_tolerance();
        if !tol.in_unit_interval(u) || !tol.in_unit_interval(v) {
            return Err(MoldError::InvalidParameter(format!(
                "parameters (u={u}, v={v}) must lie in [0, 1]"
            )));
        }
        Ok(cage)
    }

    /// Corner-interpolation tier; no refinement is performed.
    pub fn evaluate_point(&self, face: usize, u: f64, v: f64) -> Result<Point3d> {
        let cage = self.check_query(face, u, v)?;
        let (u, v) = (u.clamp(0.0, 1.0), v.clamp(0.0, 1.0));
        let corners: Vec<Point3d> = cage.faces[face].iter().map(|&i| cage.vertices[i]).collect();
        Ok(match corners.len() {
            4 => Point3d::weighted_sum(&corners, &[(1.0 - u) * (1.0 - v), u * (1.0 - v), u * v, (1.0 - u) * v]),
            3 => Point3d::weighted_sum(&corners, &[1.0 - u - v, u, v]),
            _ => Point3d::centroid(&corners),
        })
    }

    pub fn evaluate_point_with(&self, face: usize, u: f64, v: f64, tier: EvalTier) -> Result<Point3d> {
        match tier {
            EvalTier::CornerInterpolation => self.evaluate_point(face, u, v),
            EvalTier::Exact => Ok(self.exact(face, u, v)?.point),
        }
    }

    fn exact(&self, face: usize, u: f64, v: f64) -> Result<SurfaceDerivatives> {
        self.check_query(face, u, v)?;
        let table = self.ensure_patch_table()?;
        table.evaluate(face, u.clamp(0.0, 1.0), v.clamp(0.0, 1.0))
    }

    /// Exact tier: position and first partial derivatives.
    pub fn evaluate_with_derivatives(&self, face: usize, u: f64, v: f64) -> Result<(Point3d, Vec3, Vec3)> {
        let d = self.exact(face, u, v)?;
        Ok((d.point, d.du, d.dv))
    }

    /// Exact tier: position, first and second partial derivatives.
    pub fn evaluate_with_second_derivatives(
        &self,
        face: usize,
        u: f64,
        v: f64,
    ) -> Result<(Point3d, Vec3, Vec3, Vec3, Vec3, Vec3)> {
        let d = self.exact(face, u, v)?;
        Ok((d.point, d.du, d.dv, d.duu, d.dvv, d.duv))
    }

    /// Exact tier: position and unit normal (+Z where the surface is singular).
    pub fn evaluate_limit(&self, face: usize, u: f64, v: f64) -> Result<(Point3d, Vec3)> {
        let d = self.exact(face, u, v)?;
        Ok((d.point, sample_normal(&d)))
    }

    fn sample(&self, face: usize, u: f64, v: f64) -> Result<LimitSample> {
        let d = self.exact(face, u, v)?;
        Ok(LimitSample {
            face,
            u,
            v,
            position: d.point,
            du: Some(d.du),
            dv: Some(d.dv),
            duu: Some(d.duu),
            dvv: Some(d.dvv),
            duv: Some(d.duv),
            normal: Some(sample_normal(&d)),
        })
    }

    /// Exact-tier samples for parallel arrays of (face, u, v).
    #[instrument(skip_all, fields(count = faces.len()))]
    pub fn batch_evaluate(&self, faces: &[usize], us: &[f64], vs: &[f64]) -> Result<Vec<LimitSample>> {
        if faces.len() != us.len() || faces.len() != vs.len() {
            return Err(MoldError::SizeMismatch {
                faces: faces.len(),
                us: us.len(),
                vs: vs.len(),
            });
        }
        self.ensure_patch_table()?;

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            (0..faces.len())
                .into_par_iter()
                .map(|i| self.sample(faces[i], us[i], vs[i]))
                .collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            (0..faces.len()).map(|i| self.sample(faces[i], us[i], vs[i])).collect()
        }
    }

    /// Uniformly refined triangle mesh of the cage.
    #[instrument(skip(self))]
    pub fn tessellate(&self, level: u32, adaptive: bool) -> Result<TessellationResult> {
        let cage = self.control_cage()?;
        if level > MAX_TESSELLATION_LEVEL {
            return Err(MoldError::InvalidParameter(format!(
                "tessellation level {level} outside [0, {MAX_TESSELLATION_LEVEL}]"
            )));
        }
        let mesh = tessellate_cage(cage, level as usize, adaptive);
        info!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            "tessellation complete"
        );
        Ok(mesh)
    }
}

fn sample_normal(d: &SurfaceDerivatives) -> Vec3 {
    let n = d.du.cross(&d.dv);
    let len = n.length();
    if len < DEGENERATE_NORMAL || !len.is_finite() {
        Vec3::Z
    } else {
        n / len
    }
}
