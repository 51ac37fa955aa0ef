//! Assertion functions for numerical comparisons with tolerance

use nalgebra::{DMatrix, Vector3};

/// Compare scalar values with tolerance
pub fn assert_scalar_close(actual: f64, expected: f64, tolerance: f64, field_name: &str) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "{}: expected {}, got {} (diff: {}, tolerance: {})",
        field_name,
        expected,
        actual,
        diff,
        tolerance
    );
}

/// Compare 3-vectors with tolerance on the Euclidean distance
pub fn assert_vec3_close(actual: &Vector3<f64>, expected: &Vector3<f64>, tolerance: f64, field_name: &str) {
    let diff = (actual - expected).norm();
    assert!(
        diff <= tolerance,
        "{}: expected {:?}, got {:?} (distance: {}, tolerance: {})",
        field_name,
        expected.as_slice(),
        actual.as_slice(),
        diff,
        tolerance
    );
}

/// Compare DMatrix element-wise with tolerance
pub fn assert_dmatrix_close(actual: &DMatrix<f64>, expected: &DMatrix<f64>, tolerance: f64, field_name: &str) {
    assert_eq!(
        actual.shape(),
        expected.shape(),
        "{}: shape mismatch",
        field_name
    );
    for i in 0..actual.nrows() {
        for j in 0..actual.ncols() {
            let diff = (actual[(i, j)] - expected[(i, j)]).abs();
            assert!(
                diff <= tolerance,
                "{}[{},{}]: expected {}, got {} (diff: {}, tolerance: {})",
                field_name,
                i,
                j,
                expected[(i, j)],
                actual[(i, j)],
                diff,
                tolerance
            );
        }
    }
}

/// Assert a covariance is finite, symmetric and positive semi-definite
pub fn assert_covariance(matrix: &DMatrix<f64>, field_name: &str) {
    assert!(
        matrix.iter().all(|v| v.is_finite()),
        "{}: non-finite entries",
        field_name
    );
    let scale = matrix.amax().max(1.0);
    assert_dmatrix_close(matrix, &matrix.transpose(), 1e-9 * scale, field_name);
    let min_eig = matrix.clone().symmetric_eigenvalues().min();
    assert!(
        min_eig >= -1e-9 * scale,
        "{}: minimum eigenvalue {} is negative",
        field_name,
        min_eig
    );
}
