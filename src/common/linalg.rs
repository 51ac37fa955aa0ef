//! Linear algebra utilities
//!
//! Gaussian helpers shared by the filter bank and the association engine:
//! Mahalanobis distances, covariance hygiene (symmetrization and the
//! positive semi-definite check), matrix square roots for sigma points and
//! angle wrapping.

use nalgebra::{DMatrix, DVector};
use std::f64::consts::{PI, TAU};

use crate::errors::NumericalError;

/// Squared Mahalanobis distance `yᵀ S⁻¹ y`.
///
/// Returns `None` when `S` is not positive definite.
pub fn mahalanobis_squared(residual: &DVector<f64>, covariance: &DMatrix<f64>) -> Option<f64> {
    let chol = covariance.clone().cholesky()?;
    let solved = chol.solve(residual);
    Some(residual.dot(&solved))
}

/// Mahalanobis distance `sqrt(yᵀ S⁻¹ y)`
pub fn mahalanobis_distance(residual: &DVector<f64>, covariance: &DMatrix<f64>) -> Option<f64> {
    mahalanobis_squared(residual, covariance).map(f64::sqrt)
}

/// Log Gaussian PDF of a residual under zero-mean covariance `S`
pub fn log_gaussian_pdf(residual: &DVector<f64>, covariance: &DMatrix<f64>) -> f64 {
    let n = residual.len() as f64;
    let chol = match covariance.clone().cholesky() {
        Some(chol) => chol,
        None => return f64::NEG_INFINITY,
    };

    // ln|S| = 2 Σ ln L_ii
    let log_det: f64 = chol.l_dirty().diagonal().iter().map(|d| 2.0 * d.ln()).sum();
    let d2 = residual.dot(&chol.solve(residual));

    -0.5 * (n * (2.0 * PI).ln() + log_det + d2)
}

/// Make matrix symmetric by averaging with its transpose
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (matrix + matrix.transpose())
}

/// Check if matrix is positive definite
pub fn is_positive_definite(matrix: &DMatrix<f64>) -> bool {
    matrix.clone().cholesky().is_some()
}

/// Smallest eigenvalue of a symmetric matrix
pub fn min_symmetric_eigenvalue(matrix: &DMatrix<f64>) -> f64 {
    if matrix.is_empty() {
        return 0.0;
    }
    matrix
        .clone()
        .symmetric_eigenvalues()
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min)
}

/// Symmetrize a covariance and verify it is positive semi-definite.
///
/// The tolerance is relative to the largest eigenvalue magnitude so that
/// covariances in large units are not rejected for rounding noise.
pub fn ensure_covariance(
    covariance: &DMatrix<f64>,
    tolerance: f64,
    context: &'static str,
) -> Result<DMatrix<f64>, NumericalError> {
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err(NumericalError::NonFinite { context });
    }

    let sym = symmetrize(covariance);
    if sym.is_empty() {
        return Ok(sym);
    }

    let eigenvalues = sym.clone().symmetric_eigenvalues();
    let scale = eigenvalues.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let min_eigenvalue = eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);

    if min_eigenvalue < -tolerance * scale {
        return Err(NumericalError::NotPositiveSemiDefinite {
            context,
            min_eigenvalue,
        });
    }

    Ok(sym)
}

/// Lower-triangular square root `L` with `L Lᵀ = P` for a PSD matrix.
///
/// Uses Cholesky when possible and falls back to the eigen-decomposition
/// `V sqrt(max(Λ, 0))` for singular but semi-definite inputs.
pub fn psd_sqrt(matrix: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if let Some(chol) = matrix.clone().cholesky() {
        return Some(chol.l());
    }

    let eigen = symmetrize(matrix).symmetric_eigen();
    if eigen.eigenvalues.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let roots = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
    Some(&eigen.eigenvectors * DMatrix::from_diagonal(&roots))
}

/// Wrap an angle into `(-π, π]`
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Block-diagonal matrix from square blocks
pub fn block_diagonal(blocks: &[&DMatrix<f64>]) -> DMatrix<f64> {
    let n: usize = blocks.iter().map(|b| b.nrows()).sum();
    let mut out = DMatrix::zeros(n, n);
    let mut offset = 0;
    for block in blocks {
        let k = block.nrows();
        out.view_mut((offset, offset), (k, k)).copy_from(*block);
        offset += k;
    }
    out
}
