//! Normal-matrix inverse for parameter covariances.

use nalgebra::DMatrix;

/// Inverse of `JᵀJ` through a Cholesky factorization.
///
/// Returns `None` when the normal matrix is not positive definite (a parameter
/// has no influence on the residuals, or two parameters are collinear).
pub fn normal_matrix_inverse(j: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let jtj = j.transpose() * j;
    let inv = jtj.cholesky()?.inverse();
    let usable = inv.iter().all(|v| v.is_finite()) && (0..inv.nrows()).all(|k| inv[(k, k)] > 0.0);
    usable.then_some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_inverse_matches_closed_form() {
        // JᵀJ = [[3, 3], [3, 5]], det = 6
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let inv = normal_matrix_inverse(&j).unwrap();
        assert!((inv[(0, 0)] - 5.0 / 6.0).abs() < 1e-12);
        assert!((inv[(0, 1)] + 0.5).abs() < 1e-12);
        assert!((inv[(1, 1)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn normal_inverse_rejects_dead_column() {
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
        assert!(normal_matrix_inverse(&j).is_none());
    }
}
