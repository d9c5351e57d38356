//! Matrix conversion utilities for the peakfit-rs library.
//!
//! The fitting engine keeps its normal equations in ndarray types. These
//! functions convert to and from nalgebra (DMatrix, DVector) so that the
//! nalgebra Cholesky backend can be used on the same data.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::error::Result;

// === ndarray <-> nalgebra conversions ===

/// Convert an ndarray Array2 to a nalgebra DMatrix.
///
/// # Arguments
///
/// * `arr` - The ndarray Array2 to convert
///
/// # Returns
///
/// * A nalgebra DMatrix with the same data
pub fn ndarray_to_nalgebra<T: Clone + nalgebra::Scalar>(arr: &Array2<T>) -> Result<DMatrix<T>> {
    // Note: ndarray is row-major by default, nalgebra is column-major
    Ok(DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| {
        arr[[i, j]].clone()
    }))
}

/// Convert a nalgebra DMatrix to an ndarray Array2.
///
/// # Arguments
///
/// * `mat` - The nalgebra DMatrix to convert
///
/// # Returns
///
/// * An ndarray Array2 with the same data
pub fn nalgebra_to_ndarray<T: Clone + nalgebra::Scalar>(mat: &DMatrix<T>) -> Result<Array2<T>> {
    Ok(Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| {
        mat[(i, j)].clone()
    }))
}

/// Convert an ndarray Array1 to a nalgebra DVector.
pub fn ndarray_vec_to_nalgebra<T: Clone + nalgebra::Scalar>(arr: &Array1<T>) -> Result<DVector<T>> {
    Ok(DVector::from_fn(arr.len(), |i, _| arr[i].clone()))
}

/// Convert a nalgebra DVector to an ndarray Array1.
pub fn nalgebra_vec_to_ndarray<T: Clone + nalgebra::Scalar>(vec: &DVector<T>) -> Result<Array1<T>> {
    Ok(Array1::from_shape_fn(vec.len(), |i| vec[i].clone()))
}
