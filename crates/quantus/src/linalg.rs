//! Small dense linear-algebra helpers shared by the density and fitting
//! layers: Cholesky factorization and the triangular solves built on it.
//!
//! Matrices here are tiny (kernel Grams over training sets, parameter
//! covariances, copula correlations), so a plain three-loop factorization
//! is used instead of an external LAPACK binding.

use ndarray::{Array1, Array2};

use crate::error::{QuantusError, Result};

/// Lower-triangular Cholesky factor `L` of a symmetric positive-definite
/// matrix `A = L Lᵀ`.
///
/// Fails when `A` is not square or not positive definite (a non-positive
/// pivot), which callers treat as a rank-deficiency signal.
pub fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(QuantusError::InvalidParameter(format!(
            "cholesky requires a square matrix (got {}x{})",
            a.nrows(),
            a.ncols()
        )));
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return Err(QuantusError::InvalidParameter(format!(
                        "matrix is not positive definite (pivot {sum} at {i})"
                    )));
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Ok(l)
}

/// Solve `L y = b` for lower-triangular `L`.
pub fn solve_lower(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    y
}

/// Solve `Lᵀ x = y` for lower-triangular `L`.
pub fn solve_upper_transpose(l: &Array2<f64>, y: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Solve `A x = b` through an existing Cholesky factor of `A`.
pub fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let y = solve_lower(l, b);
    solve_upper_transpose(l, &y)
}

/// Inverse of a symmetric positive-definite matrix from its Cholesky
/// factor, column by column.
pub fn cholesky_inverse(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut e = Array1::<f64>::zeros(n);
        e[j] = 1.0;
        let col = cholesky_solve(l, &e);
        for i in 0..n {
            inv[[i, j]] = col[i];
        }
    }
    inv
}

/// Log-determinant of `A` from its Cholesky factor: `2 Σ ln L_ii`.
pub fn cholesky_log_det(l: &Array2<f64>) -> f64 {
    (0..l.nrows()).map(|i| l[[i, i]].ln()).sum::<f64>() * 2.0
}
