//! Unscented transform
//!
//! Scaled sigma points (Van der Merwe) with `λ = α²(n + κ) - n`:
//!
//! ```text
//! χ₀ = x,  χᵢ = x ± √(n + λ) · Lᵢ,   L Lᵀ = P
//! Wm₀ = λ / (n + λ),  Wc₀ = Wm₀ + (1 - α² + β),  Wᵢ = 1 / (2(n + λ))
//! ```
//!
//! Angular components are averaged on the circle and differenced with
//! wrapping so sigma points straddling ±π do not corrupt the moments.

use nalgebra::{DMatrix, DVector};

use crate::common::linalg::{psd_sqrt, wrap_angle};
use crate::config::FilterFamily;
use crate::errors::NumericalError;

/// Sigma-point scaling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnscentedParams {
    /// Spread of the sigma points
    pub alpha: f64,
    /// Distribution prior (2 for Gaussians)
    pub beta: f64,
    /// Secondary scaling
    pub kappa: f64,
}

impl Default for UnscentedParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 2.0,
            kappa: 0.0,
        }
    }
}

impl UnscentedParams {
    /// Parameters of an unscented family, `None` for Kalman
    pub fn from_family(family: &FilterFamily) -> Option<Self> {
        match *family {
            FilterFamily::Unscented { alpha, beta, kappa } => Some(Self { alpha, beta, kappa }),
            FilterFamily::Kalman => None,
        }
    }

    /// `λ` for state dimension `n`
    #[inline]
    pub fn lambda(&self, n: usize) -> f64 {
        let n = n as f64;
        self.alpha * self.alpha * (n + self.kappa) - n
    }

    /// Mean and covariance weights for `2n + 1` points
    pub fn weights(&self, n: usize) -> (Vec<f64>, Vec<f64>) {
        let lambda = self.lambda(n);
        let scale = n as f64 + lambda;
        let w = 0.5 / scale;
        let mut wm = vec![w; 2 * n + 1];
        let mut wc = vec![w; 2 * n + 1];
        wm[0] = lambda / scale;
        wc[0] = wm[0] + (1.0 - self.alpha * self.alpha + self.beta);
        (wm, wc)
    }
}

/// Sigma points of a Gaussian with their weights
#[derive(Debug, Clone)]
pub struct SigmaPoints {
    /// `2n + 1` points, the mean first
    pub points: Vec<DVector<f64>>,
    /// Mean weights
    pub wm: Vec<f64>,
    /// Covariance weights
    pub wc: Vec<f64>,
}

impl SigmaPoints {
    /// Sigma points of `N(mean, covariance)`.
    ///
    /// Angular entries of the points are wrapped to `(-π, π]`.
    pub fn new(
        mean: &DVector<f64>,
        covariance: &DMatrix<f64>,
        params: &UnscentedParams,
        angle_indices: &[usize],
    ) -> Result<Self, NumericalError> {
        let n = mean.len();
        let scale = n as f64 + params.lambda(n);
        if !(scale > 0.0) {
            return Err(NumericalError::NonFinite {
                context: "sigma-point scale",
            });
        }

        let root = psd_sqrt(covariance).ok_or(NumericalError::NotPositiveSemiDefinite {
            context: "sigma-point",
            min_eigenvalue: f64::NAN,
        })? * scale.sqrt();

        let mut points = Vec::with_capacity(2 * n + 1);
        points.push(mean.clone());
        for sign in [1.0, -1.0] {
            for i in 0..n {
                let mut point = mean + root.column(i) * sign;
                for &a in angle_indices {
                    point[a] = wrap_angle(point[a]);
                }
                points.push(point);
            }
        }

        let (wm, wc) = params.weights(n);
        Ok(Self { points, wm, wc })
    }

    /// Apply `f` to every point
    pub fn map<F>(&self, f: F) -> Vec<DVector<f64>>
    where
        F: Fn(&DVector<f64>) -> DVector<f64>,
    {
        self.points.iter().map(f).collect()
    }
}

/// Difference `a - b` with angular entries wrapped
pub fn difference(a: &DVector<f64>, b: &DVector<f64>, angle_indices: &[usize]) -> DVector<f64> {
    let mut d = a - b;
    for &i in angle_indices {
        d[i] = wrap_angle(d[i]);
    }
    d
}

/// Weighted mean; angular entries use the circular mean
pub fn weighted_mean(points: &[DVector<f64>], wm: &[f64], angle_indices: &[usize]) -> DVector<f64> {
    let dim = points.first().map_or(0, |p| p.len());
    let mut mean = DVector::zeros(dim);
    for (p, &w) in points.iter().zip(wm) {
        mean += p * w;
    }
    for &a in angle_indices {
        let (sin, cos) = points
            .iter()
            .zip(wm)
            .fold((0.0, 0.0), |(s, c), (p, &w)| (s + w * p[a].sin(), c + w * p[a].cos()));
        mean[a] = sin.atan2(cos);
    }
    mean
}

/// Weighted covariance of points about `mean`
pub fn weighted_covariance(
    points: &[DVector<f64>],
    mean: &DVector<f64>,
    wc: &[f64],
    angle_indices: &[usize],
) -> DMatrix<f64> {
    let n = mean.len();
    let mut cov = DMatrix::zeros(n, n);
    for (p, &w) in points.iter().zip(wc) {
        let d = difference(p, mean, angle_indices);
        cov += &d * d.transpose() * w;
    }
    cov
}

/// Weighted cross-covariance between two point sets
pub fn weighted_cross_covariance(
    xs: &[DVector<f64>],
    x_mean: &DVector<f64>,
    x_angles: &[usize],
    zs: &[DVector<f64>],
    z_mean: &DVector<f64>,
    z_angles: &[usize],
    wc: &[f64],
) -> DMatrix<f64> {
    let mut cross = DMatrix::zeros(x_mean.len(), z_mean.len());
    for ((x, z), &w) in xs.iter().zip(zs).zip(wc) {
        let dx = difference(x, x_mean, x_angles);
        let dz = difference(z, z_mean, z_angles);
        cross += &dx * dz.transpose() * w;
    }
    cross
}
