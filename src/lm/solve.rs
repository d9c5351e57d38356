//! Linear solve of the normal equations.
//!
//! Each fitting step solves `H · δ = J` for the parameter update `δ`, where
//! `H` is the (possibly damped) Gauss-Newton Hessian of one peak and `J` the
//! matching gradient. `H` is small (at most 7×7) and symmetric, so a
//! Cholesky factorization is used. A matrix that is not positive-definite is
//! reported as [`PeakFitError::SingularMatrix`]; the caller decides how to
//! recover (the Levenberg-Marquardt engine raises its damping and retries).

use ndarray::{Array1, Array2};

use crate::error::{PeakFitError, Result};

use super::config::SolverMethod;

/// Solve `hessian · x = jacobian` with the selected method.
pub fn solve_with(
    method: SolverMethod,
    hessian: &Array2<f64>,
    jacobian: &Array1<f64>,
) -> Result<Array1<f64>> {
    match method {
        SolverMethod::Cholesky => solve(hessian, jacobian),
        SolverMethod::Nalgebra => solve_nalgebra(hessian, jacobian),
    }
}

/// Solve `hessian · x = jacobian` using Cholesky decomposition.
///
/// Only the lower triangle of `hessian` is read.
///
/// # Errors
///
/// * `PeakFitError::DimensionMismatch` if the shapes do not agree
/// * `PeakFitError::SingularMatrix` if the matrix is not positive-definite
pub fn solve(hessian: &Array2<f64>, jacobian: &Array1<f64>) -> Result<Array1<f64>> {
    let n = check_dimensions(hessian, jacobian)?;
    let l = cholesky_lower(hessian)?;

    // Forward substitution (L * y = b)
    let mut y = jacobian.clone();
    for i in 0..n {
        for j in 0..i {
            y[i] -= l[[i, j]] * y[j];
        }
        y[i] /= l[[i, i]];
    }

    // Backward substitution (L^T * x = y)
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in (i + 1)..n {
            x[i] -= l[[j, i]] * x[j];
        }
        x[i] /= l[[i, i]];
    }

    Ok(x)
}

/// Lower-triangular Cholesky factor `L` with `A = L · Lᵀ`.
pub fn cholesky_lower(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for k in 0..n {
        let mut pivot = a[[k, k]];
        for j in 0..k {
            pivot -= l[[k, j]] * l[[k, j]];
        }

        // NaN pivots fail this test too.
        if !(pivot > 0.0) || !pivot.is_finite() {
            return Err(PeakFitError::SingularMatrix);
        }

        let lkk = pivot.sqrt();
        l[[k, k]] = lkk;

        for i in (k + 1)..n {
            let mut v = a[[i, k]];
            for j in 0..k {
                v -= l[[i, j]] * l[[k, j]];
            }
            l[[i, k]] = v / lkk;
        }
    }

    Ok(l)
}

fn check_dimensions(hessian: &Array2<f64>, jacobian: &Array1<f64>) -> Result<usize> {
    let n = jacobian.len();
    if hessian.nrows() != n || hessian.ncols() != n {
        return Err(PeakFitError::DimensionMismatch(format!(
            "Hessian is {}x{}, Jacobian has {} terms",
            hessian.nrows(),
            hessian.ncols(),
            n
        )));
    }
    if n == 0 {
        return Err(PeakFitError::DimensionMismatch(
            "Empty normal equations".to_string(),
        ));
    }
    Ok(n)
}

#[cfg(feature = "matrix")]
fn solve_nalgebra(hessian: &Array2<f64>, jacobian: &Array1<f64>) -> Result<Array1<f64>> {
    use crate::utils::matrix_convert::{
        nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
    };

    check_dimensions(hessian, jacobian)?;
    let a = ndarray_to_nalgebra(hessian)?;
    let b = ndarray_vec_to_nalgebra(jacobian)?;

    let chol = a.cholesky().ok_or(PeakFitError::SingularMatrix)?;
    let x = chol.solve(&b);
    if x.iter().any(|v| !v.is_finite()) {
        return Err(PeakFitError::SingularMatrix);
    }

    nalgebra_vec_to_ndarray(&x)
}

#[cfg(not(feature = "matrix"))]
fn solve_nalgebra(_hessian: &Array2<f64>, _jacobian: &Array1<f64>) -> Result<Array1<f64>> {
    Err(PeakFitError::NotAvailable(
        "nalgebra solver requires the `matrix` feature".to_string(),
    ))
}
