//! Utility functions and helpers for the peakfit-rs library.

#[cfg(feature = "matrix")]
pub mod matrix_convert;

// Re-export commonly used utilities
#[cfg(feature = "matrix")]
pub use matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};
