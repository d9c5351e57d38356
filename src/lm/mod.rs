//! Levenberg-Marquardt fitting of the peaks of a [`crate::context::FitContext`].
//!
//! This module provides the per-peak iteration algorithms, the small linear
//! solve they rely on, the fitting constants and the convergence criteria.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod original;
pub mod solve;

// Re-export key types
pub use config::{FitConfig, FitStrategy, SolverMethod};
pub use convergence::{ConvergenceCriteria, PeakStatus};
pub use solve::{solve, solve_with};
