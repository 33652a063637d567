//! Rational B-spline fitting of exact limit-surface samples.
//!
//! Samples are taken on a uniform (u, v) grid of one base face and fitted
//! with the tensor-product global interpolation scheme: each direction is
//! solved independently with the same collocation matrix, first along u and
//! then along v. When fewer control points than samples are requested, the
//! collocation systems are solved in the least-squares sense instead.

use nalgebra::DMatrix;
use tracing::{info, instrument};

use crate::error::{MoldError, Result};
use crate::geometry::bounds::BoundingBox;
use crate::geometry::nurbs::{RationalSurfacePatch, basis_functions, clamped_uniform_knots, find_span};
use crate::geometry::point::Point3d;
use crate::subdivision::{EvalTier, LimitSurfaceEvaluator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    /// Upper bound on the degree in each direction; the fitted degree is
    /// `min(max_degree, control points - 1)`.
    pub max_degree: usize,
    /// Control points per direction. `None` interpolates every sample.
    pub control_points: Option<usize>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_degree: 3,
            control_points: None,
        }
    }
}

/// Fits a [`RationalSurfacePatch`] to one base face of an evaluator's limit
/// surface. Sampling always uses the exact tier.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceFitter<'a> {
    evaluator: &'a LimitSurfaceEvaluator,
    options: FitOptions,
}

impl<'a> SurfaceFitter<'a> {
    pub fn new(evaluator: &'a LimitSurfaceEvaluator) -> Self {
        Self::with_options(evaluator, FitOptions::default())
    }

    pub fn with_options(evaluator: &'a LimitSurfaceEvaluator, options: FitOptions) -> Self {
        Self { evaluator, options }
    }

    #[instrument(skip(self))]
    pub fn fit_surface(&self, faces: &[usize], sample_density: usize) -> Result<RationalSurfacePatch> {
        let face = match faces {
            [] => return Err(MoldError::InvalidInput("fit_surface needs at least one face".into())),
            [face] => *face,
            _ => {
                return Err(MoldError::UnsupportedOperation(format!(
                    "fitting {} faces into one patch needs boundary stitching; fit one face at a time",
                    faces.len()
                )));
            }
        };
        if sample_density < 2 {
            return Err(MoldError::InvalidInput(format!(
                "sample density must be at least 2, got {sample_density}"
            )));
        }
        let face_count = self.evaluator.control_face_count()?;
        if face >= face_count {
            return Err(MoldError::InvalidParameter(format!(
                "face index {face} out of range (cage has {face_count} faces)"
            )));
        }
        let corners = self.evaluator.control_cage()?.faces[face].len();
        if corners != 4 {
            return Err(MoldError::UnsupportedOperation(format!(
                "face {face} has {corners} corners; only quad faces map onto a single patch"
            )));
        }

        let params = uniform_params(sample_density);
        let samples = self.sample_face(face, &params)?;
        if samples.len() != sample_density * sample_density {
            return Err(MoldError::Internal(format!(
                "expected {} samples, collected {}",
                sample_density * sample_density,
                samples.len()
            )));
        }
        check_samples(&samples)?;

        let count = self
            .options
            .control_points
            .unwrap_or(sample_density)
            .clamp(2, sample_density);
        let degree = self.options.max_degree.max(1).min(count - 1);
        let knots = if count == sample_density {
            averaged_knots(&params, degree)
        } else {
            clamped_uniform_knots(count, degree)
        };

        let control_points = solve_grid(&samples, &params, &knots, count, degree)?;
        let weights = vec![1.0; control_points.len()];
        let patch = RationalSurfacePatch::new(
            degree,
            degree,
            count,
            count,
            control_points,
            weights,
            knots.clone(),
            knots,
        )
        .map_err(|e| MoldError::FittingFailed(e.to_string()))?;

        info!(face, degree, control_points = count * count, "surface fitted");
        Ok(patch)
    }

    /// Exact-tier samples, `samples[i * n + j]` at `(params[i], params[j])`.
    fn sample_face(&self, face: usize, params: &[f64]) -> Result<Vec<Point3d>> {
        let mut samples = Vec::with_capacity(params.len() * params.len());
        for &u in params {
            for &v in params {
                samples.push(self.evaluator.evaluate_point_with(face, u, v, EvalTier::Exact)?);
            }
        }
        Ok(samples)
    }
}

fn uniform_params(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
}

/// Clamped knots whose interior values average `degree` consecutive
/// parameters, which keeps the interpolation matrix well conditioned.
fn averaged_knots(params: &[f64], degree: usize) -> Vec<f64> {
    let n = params.len();
    let mut knots = vec![0.0; degree + 1];
    for j in 1..n - degree {
        let sum: f64 = params[j..j + degree].iter().sum();
        knots.push(sum / degree as f64);
    }
    knots.extend(std::iter::repeat_n(1.0, degree + 1));
    knots
}

fn check_samples(samples: &[Point3d]) -> Result<()> {
    if let Some(i) = samples.iter().position(|p| !p.is_finite()) {
        return Err(MoldError::FittingFailed(format!("sample {i} is not finite")));
    }
    let extent = BoundingBox::from_points(samples).diagonal();
    if extent < crate::default_tolerance().coincidence {
        return Err(MoldError::FittingFailed(format!(
            "samples collapse to a point (extent {extent:e})"
        )));
    }
    Ok(())
}

/// Collocation matrix `N[i][k] = N_k(params[i])`.
fn collocation(params: &[f64], knots: &[f64], count: usize, degree: usize) -> DMatrix<f64> {
    let mut n = DMatrix::zeros(params.len(), count);
    for (i, &t) in params.iter().enumerate() {
        let span = find_span(knots, count, degree, t);
        for (k, b) in basis_functions(knots, span, t, degree).into_iter().enumerate() {
            n[(i, span - degree + k)] = b;
        }
    }
    n
}

/// Solve `N C Nᵀ = Q` per coordinate for the control grid `C`.
fn solve_grid(
    samples: &[Point3d],
    params: &[f64],
    knots: &[f64],
    count: usize,
    degree: usize,
) -> Result<Vec<Point3d>> {
    let d = params.len();
    let n = collocation(params, knots, count, degree);
    let interpolating = count == d;
    let system = if interpolating { n.clone() } else { n.transpose() * &n };
    let lu = system.lu();
    let nt = n.transpose();

    let solve = |rhs: DMatrix<f64>| -> Result<DMatrix<f64>> {
        let rhs = if interpolating { rhs } else { &nt * rhs };
        let x = lu
            .solve(&rhs)
            .ok_or_else(|| MoldError::FittingFailed("collocation matrix is singular".into()))?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(MoldError::FittingFailed("collocation solve produced non-finite values".into()));
        }
        Ok(x)
    };

    let mut coords = Vec::with_capacity(3);
    for axis in 0..3 {
        let q = DMatrix::from_fn(d, d, |i, j| samples[i * d + j].to_array()[axis]);
        // Along u, then along v on the transposed intermediate.
        let r = solve(q)?;
        let c = solve(r.transpose())?.transpose();
        coords.push(c);
    }

    Ok((0..count)
        .flat_map(|i| (0..count).map(move |j| (i, j)))
        .map(|(i, j)| Point3d::new(coords[0][(i, j)], coords[1][(i, j)], coords[2][(i, j)]))
        .collect())
}
