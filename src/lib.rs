//! # peakfit-rs
//!
//! `peakfit-rs` fits a variable number of overlapping peaks (point-source
//! images) onto a noisy 2-D image, recovering the position, height, width and
//! background of each peak. Each pixel is weighted by its sCMOS noise term.
//!
//! The library provides:
//! - A fit context that keeps the sum of all peaks in shared accumulators, so
//!   one peak can be refined while its neighbours stay in place
//! - Per-peak Levenberg-Marquardt iteration and the original clamped variant
//! - Peak lifecycle management (adding, recentering, pruning, status queries)
//! - A 2-D Gaussian peak shape, and a trait for plugging in others
//!
//! ## Basic Usage
//!
//! ```
//! use ndarray::Array2;
//! use peakfit_rs::{FitConfig, FitContext, FitStrategy, GaussianPsf, PeakProperty};
//!
//! let image = Array2::from_elem((32, 32), 10.0);
//! let scmos = Array2::ones((32, 32));
//! let mut ctx = FitContext::new(GaussianPsf::fixed(1.5), image, scmos, FitConfig::default())?;
//!
//! ctx.new_peaks_at(&[(15.0, 16.0, 0.0)])?;
//! ctx.iterate_until_converged(FitStrategy::LevenbergMarquardt, 50);
//!
//! let x = ctx.peak_property(PeakProperty::X);
//! assert_eq!(x.len(), 1);
//! # Ok::<(), peakfit_rs::PeakFitError>(())
//! ```

pub mod aoi;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod lm;
pub mod models;
pub mod peak;

pub mod utils;

// Re-exports for convenience
pub use aoi::FitImage;
pub use context::{FitContext, PeakProperty};
pub use diagnostics::{FitDiagnostics, FitFault};
pub use error::{PeakFitError, Result};
pub use lm::{FitConfig, FitStrategy, PeakStatus, SolverMethod};
pub use models::{GaussianPsf, GaussianWidth, PeakModelData, PeakShape};
pub use peak::{PeakData, NFITTING};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
