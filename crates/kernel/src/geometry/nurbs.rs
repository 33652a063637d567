use approx::abs_diff_eq;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bounds::BoundingBox;
use super::point::Point3d;
use super::vector::Vec3;

/// Structural problems detected when building or validating a patch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    #[error("degree must be at least 1 (degree_u={degree_u}, degree_v={degree_v})")]
    InvalidDegree { degree_u: usize, degree_v: usize },

    #[error("control grid {count_u}x{count_v} too small for degrees ({degree_u}, {degree_v})")]
    ControlGridTooSmall {
        count_u: usize,
        count_v: usize,
        degree_u: usize,
        degree_v: usize,
    },

    #[error("expected {expected} control points, got {actual}")]
    ControlPointCount { expected: usize, actual: usize },

    #[error("expected {expected} weights, got {actual}")]
    WeightCount { expected: usize, actual: usize },

    #[error("weight {index} is not positive ({value})")]
    NonPositiveWeight { index: usize, value: f64 },

    #[error("knot vector {direction} has {actual} entries, expected {expected}")]
    KnotCount {
        direction: char,
        expected: usize,
        actual: usize,
    },

    #[error("knot vector {direction} decreases at index {index}")]
    DecreasingKnots { direction: char, index: usize },

    #[error("knot vector {direction} is not clamped to [0, 1]")]
    KnotsNotClamped { direction: char },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Position and partial derivatives of a surface at one parameter location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDerivatives {
    pub point: Point3d,
    pub du: Vec3,
    pub dv: Vec3,
    pub duu: Vec3,
    pub dvv: Vec3,
    pub duv: Vec3,
}

impl SurfaceDerivatives {
    /// Unit normal `du x dv`, or `None` at a degenerate (singular) point.
    pub fn normal(&self) -> Option<Vec3> {
        self.du.cross(&self.dv).normalized()
    }
}

/// A tensor-product rational B-spline patch over the clamped domain [0,1]².
///
/// Control points are stored row-major: `control_points[i * count_v + j]` is
/// the point at u-index `i`, v-index `j`. Fitted patches are non-rational in
/// practice (all weights 1.0) but evaluation honours arbitrary positive weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RationalSurfacePatch {
    pub degree_u: usize,
    pub degree_v: usize,
    pub count_u: usize,
    pub count_v: usize,
    pub control_points: Vec<Point3d>,
    pub weights: Vec<f64>,
    pub knots_u: Vec<f64>,
    pub knots_v: Vec<f64>,
    pub periodic_u: bool,
    pub periodic_v: bool,
}

impl RationalSurfacePatch {
    /// Build and validate a patch.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        degree_u: usize,
        degree_v: usize,
        count_u: usize,
        count_v: usize,
        control_points: Vec<Point3d>,
        weights: Vec<f64>,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
    ) -> Result<Self, PatchError> {
        let patch = Self {
            degree_u,
            degree_v,
            count_u,
            count_v,
            control_points,
            weights,
            knots_u,
            knots_v,
            periodic_u: false,
            periodic_v: false,
        };
        patch.validate()?;
        Ok(patch)
    }

    /// Non-rational patch with clamped uniform knots in both directions.
    pub fn bspline_uniform(
        degree_u: usize,
        degree_v: usize,
        count_u: usize,
        count_v: usize,
        control_points: Vec<Point3d>,
    ) -> Result<Self, PatchError> {
        let weights = vec![1.0; control_points.len()];
        Self::new(
            degree_u,
            degree_v,
            count_u,
            count_v,
            control_points,
            weights,
            clamped_uniform_knots(count_u, degree_u),
            clamped_uniform_knots(count_v, degree_v),
        )
    }

    /// A copy of this patch with replaced control points; every other field is
    /// carried over unchanged.
    pub fn with_control_points(&self, control_points: Vec<Point3d>) -> Result<Self, PatchError> {
        let patch = Self {
            control_points,
            ..self.clone()
        };
        patch.validate()?;
        Ok(patch)
    }

    /// Check every structural invariant of the patch.
    pub fn validate(&self) -> Result<(), PatchError> {
        if self.degree_u < 1 || self.degree_v < 1 {
            return Err(PatchError::InvalidDegree {
                degree_u: self.degree_u,
                degree_v: self.degree_v,
            });
        }
        if self.count_u < 2 || self.count_v < 2 || self.count_u <= self.degree_u || self.count_v <= self.degree_v {
            return Err(PatchError::ControlGridTooSmall {
                count_u: self.count_u,
                count_v: self.count_v,
                degree_u: self.degree_u,
                degree_v: self.degree_v,
            });
        }
        let expected = self.count_u * self.count_v;
        if self.control_points.len() != expected {
            return Err(PatchError::ControlPointCount {
                expected,
                actual: self.control_points.len(),
            });
        }
        if self.control_points.iter().any(|p| !p.is_finite()) {
            return Err(PatchError::NonFinite("control points"));
        }
        if self.weights.len() != expected {
            return Err(PatchError::WeightCount {
                expected,
                actual: self.weights.len(),
            });
        }
        for (index, &value) in self.weights.iter().enumerate() {
            if !value.is_finite() {
                return Err(PatchError::NonFinite("weights"));
            }
            if value <= 0.0 {
                return Err(PatchError::NonPositiveWeight { index, value });
            }
        }
        validate_knots(&self.knots_u, self.count_u, self.degree_u, 'U')?;
        validate_knots(&self.knots_v, self.count_v, self.degree_v, 'V')?;
        Ok(())
    }

    pub fn control_point(&self, i: usize, j: usize) -> Point3d {
        self.control_points[i * self.count_v + j]
    }

    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.weights[i * self.count_v + j]
    }

    pub fn is_rational(&self) -> bool {
        self.weights.iter().any(|&w| !abs_diff_eq!(w, 1.0, epsilon = 1e-12))
    }

    pub fn domain_u(&self) -> (f64, f64) {
        (self.knots_u[self.degree_u], self.knots_u[self.count_u])
    }

    pub fn domain_v(&self) -> (f64, f64) {
        (self.knots_v[self.degree_v], self.knots_v[self.count_v])
    }

    /// Surface point at the minimum-parameter corner of the domain.
    pub fn min_corner_point(&self) -> Point3d {
        let (u0, _) = self.domain_u();
        let (v0, _) = self.domain_v();
        self.evaluate(u0, v0)
    }

    pub fn control_bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.control_points)
    }

    /// Evaluate the surface at (u, v).
    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let span_u = find_span(&self.knots_u, self.count_u, self.degree_u, u);
        let span_v = find_span(&self.knots_v, self.count_v, self.degree_v, v);
        let basis_u = basis_functions(&self.knots_u, span_u, u, self.degree_u);
        let basis_v = basis_functions(&self.knots_v, span_v, v, self.degree_v);

        let mut acc = Vec3::ZERO;
        let mut w_sum = 0.0;
        for (a, nu) in basis_u.iter().enumerate() {
            let i = span_u - self.degree_u + a;
            for (b, nv) in basis_v.iter().enumerate() {
                let j = span_v - self.degree_v + b;
                let bw = nu * nv * self.weight(i, j);
                acc += self.control_point(i, j).to_vec3() * bw;
                w_sum += bw;
            }
        }
        Point3d::from_vec3(acc / w_sum)
    }

    /// Position with analytic first and second partial derivatives.
    pub fn derivatives(&self, u: f64, v: f64) -> SurfaceDerivatives {
        let span_u = find_span(&self.knots_u, self.count_u, self.degree_u, u);
        let span_v = find_span(&self.knots_v, self.count_v, self.degree_v, v);
        let ders_u = basis_function_derivatives(&self.knots_u, span_u, u, self.degree_u, 2);
        let ders_v = basis_function_derivatives(&self.knots_v, span_v, v, self.degree_v, 2);

        // Homogeneous sums: a[k][l] = d^(k+l) A / du^k dv^l, w[k][l] likewise.
        let mut a = [[Vec3::ZERO; 3]; 3];
        let mut w = [[0.0f64; 3]; 3];
        for ia in 0..=self.degree_u {
            let i = span_u - self.degree_u + ia;
            for jb in 0..=self.degree_v {
                let j = span_v - self.degree_v + jb;
                let wt = self.weight(i, j);
                let p = self.control_point(i, j).to_vec3() * wt;
                for k in 0..3 {
                    for l in 0..(3 - k) {
                        let n = ders_u[k][ia] * ders_v[l][jb];
                        a[k][l] += p * n;
                        w[k][l] += wt * n;
                    }
                }
            }
        }

        let w0 = w[0][0];
        let s = a[0][0] / w0;
        let su = (a[1][0] - s * w[1][0]) / w0;
        let sv = (a[0][1] - s * w[0][1]) / w0;
        let suu = (a[2][0] - su * (2.0 * w[1][0]) - s * w[2][0]) / w0;
        let svv = (a[0][2] - sv * (2.0 * w[0][1]) - s * w[0][2]) / w0;
        let suv = (a[1][1] - su * w[0][1] - sv * w[1][0] - s * w[1][1]) / w0;

        SurfaceDerivatives {
            point: Point3d::from_vec3(s),
            du: su,
            dv: sv,
            duu: suu,
            dvv: svv,
            duv: suv,
        }
    }

    /// Unit surface normal `du x dv`; `None` at singular points.
    pub fn normal(&self, u: f64, v: f64) -> Option<Vec3> {
        self.derivatives(u, v).normal()
    }
}

/// Clamped knot vector with uniformly spaced interior knots on [0,1].
pub fn clamped_uniform_knots(count: usize, degree: usize) -> Vec<f64> {
    let spans = count - degree;
    let mut knots = Vec::with_capacity(count + degree + 1);
    knots.extend(std::iter::repeat_n(0.0, degree + 1));
    for k in 1..spans {
        knots.push(k as f64 / spans as f64);
    }
    knots.extend(std::iter::repeat_n(1.0, degree + 1));
    knots
}

fn validate_knots(knots: &[f64], count: usize, degree: usize, direction: char) -> Result<(), PatchError> {
    let expected = count + degree + 1;
    if knots.len() != expected {
        return Err(PatchError::KnotCount {
            direction,
            expected,
            actual: knots.len(),
        });
    }
    if knots.iter().any(|k| !k.is_finite()) {
        return Err(PatchError::NonFinite("knots"));
    }
    if let Some(index) = knots.windows(2).position(|w| w[1] < w[0]) {
        return Err(PatchError::DecreasingKnots {
            direction,
            index: index + 1,
        });
    }
    let start_clamped = knots[..=degree].iter().all(|&k| abs_diff_eq!(k, 0.0, epsilon = 1e-12));
    let end_clamped = knots[count..].iter().all(|&k| abs_diff_eq!(k, 1.0, epsilon = 1e-12));
    if !start_clamped || !end_clamped {
        return Err(PatchError::KnotsNotClamped { direction });
    }
    Ok(())
}

/// Find the knot span index for parameter t using binary search.
pub(crate) fn find_span(knots: &[f64], count: usize, degree: usize, t: f64) -> usize {
    let n = count - 1;
    let p = degree;
    if t >= knots[n + 1] {
        return n;
    }
    if t <= knots[p] {
        return p;
    }
    let mut low = p;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Non-zero B-spline basis functions `N[span-p..=span]` at parameter t.
pub(crate) fn basis_functions(knots: &[f64], span: usize, t: f64, degree: usize) -> Vec<f64> {
    let p = degree;
    let mut n_vals = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];

    n_vals[0] = 1.0;
    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let temp = n_vals[r] / (right[r + 1] + left[j - r]);
            n_vals[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n_vals[j] = saved;
    }
    n_vals
}

/// Basis functions and their derivatives up to order `n`:
/// `ders[k][j]` is the k-th derivative of `N[span-p+j]` at t.
/// Orders above the degree are returned as zero rows.
pub(crate) fn basis_function_derivatives(knots: &[f64], span: usize, t: f64, degree: usize, n: usize) -> Vec<Vec<f64>> {
    let p = degree;
    let mut ndu = vec![vec![0.0; p + 1]; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    ndu[0][0] = 1.0;
    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            // Lower triangle holds knot differences, upper triangle basis values.
            ndu[j][r] = right[r + 1] + left[j - r];
            let temp = ndu[r][j - 1] / ndu[j][r];
            ndu[r][j] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        ndu[j][j] = saved;
    }

    let mut ders = vec![vec![0.0; p + 1]; n + 1];
    for j in 0..=p {
        ders[0][j] = ndu[j][p];
    }

    let mut a = vec![vec![0.0; p + 1]; 2];
    for r in 0..=p {
        let (mut s1, mut s2) = (0usize, 1usize);
        a[0][0] = 1.0;
        for k in 1..=n.min(p) {
            let mut d = 0.0;
            let rk = r as isize - k as isize;
            let pk = p - k;
            if r >= k {
                a[s2][0] = a[s1][0] / ndu[pk + 1][rk as usize];
                d = a[s2][0] * ndu[rk as usize][pk];
            }
            let j1 = if rk >= -1 { 1 } else { (-rk) as usize };
            let j2 = if (r as isize - 1) <= pk as isize { k - 1 } else { p - r };
            for j in j1..=j2 {
                let idx = (rk + j as isize) as usize;
                a[s2][j] = (a[s1][j] - a[s1][j - 1]) / ndu[pk + 1][idx];
                d += a[s2][j] * ndu[idx][pk];
            }
            if r <= pk {
                a[s2][k] = -a[s1][k - 1] / ndu[pk + 1][r];
                d += a[s2][k] * ndu[r][pk];
            }
            ders[k][r] = d;
            std::mem::swap(&mut s1, &mut s2);
        }
    }

    let mut factor = p as f64;
    for k in 1..=n.min(p) {
        for value in ders[k].iter_mut() {
            *value *= factor;
        }
        factor *= (p - k) as f64;
    }
    ders
}
