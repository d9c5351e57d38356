//! Fitting diagnostics.
//!
//! Per-peak failures never abort a fit. Each one is classified as a
//! [`FitFault`], triggers a local recovery in the iteration engine and is
//! counted in the context's [`FitDiagnostics`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Recoverable per-peak failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FitFault {
    /// The normal equations were not positive-definite.
    Solver,

    /// The AOI would leave the image.
    Margin,

    /// The height went negative.
    NegativeHeight,

    /// A width went negative.
    NegativeWidth,

    /// The fit intensity (foreground plus background) went negative.
    NegativeIntensity,

    /// The step did not decrease the error.
    NonDecreasing,
}

impl fmt::Display for FitFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FitFault::Solver => "solver failure",
            FitFault::Margin => "outside margins",
            FitFault::NegativeHeight => "negative height",
            FitFault::NegativeWidth => "negative width",
            FitFault::NegativeIntensity => "negative fit intensity",
            FitFault::NonDecreasing => "non-decreasing error",
        };
        write!(f, "{}", text)
    }
}

/// Counters describing what happened during fitting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// Number reset due to an error trying to solve Ax = b.
    pub n_dposv: u64,
    /// Number of iterations of fitting.
    pub n_iterations: u64,
    /// Number of fits that were lost altogether.
    pub n_lost: u64,
    /// Number reset because they were too close to the edge of the image.
    pub n_margin: u64,
    /// Number reset due to a negative fi.
    pub n_neg_fi: u64,
    /// Number reset due to negative height.
    pub n_neg_height: u64,
    /// Number reset due to negative width.
    pub n_neg_width: u64,
    /// Number of fits that did not converge.
    pub n_non_converged: u64,
    /// Number of restarts due to non-decreasing error.
    pub n_non_decr: u64,
}

impl FitDiagnostics {
    /// Count one occurrence of `fault`.
    pub fn record(&mut self, fault: FitFault) {
        let counter = match fault {
            FitFault::Solver => &mut self.n_dposv,
            FitFault::Margin => &mut self.n_margin,
            FitFault::NegativeHeight => &mut self.n_neg_height,
            FitFault::NegativeWidth => &mut self.n_neg_width,
            FitFault::NegativeIntensity => &mut self.n_neg_fi,
            FitFault::NonDecreasing => &mut self.n_non_decr,
        };
        *counter += 1;
    }

    /// Number of recorded occurrences of `fault`.
    pub fn count(&self, fault: FitFault) -> u64 {
        match fault {
            FitFault::Solver => self.n_dposv,
            FitFault::Margin => self.n_margin,
            FitFault::NegativeHeight => self.n_neg_height,
            FitFault::NegativeWidth => self.n_neg_width,
            FitFault::NegativeIntensity => self.n_neg_fi,
            FitFault::NonDecreasing => self.n_non_decr,
        }
    }

    /// Total number of recorded faults of any kind.
    pub fn total_faults(&self) -> u64 {
        self.n_dposv
            + self.n_margin
            + self.n_neg_height
            + self.n_neg_width
            + self.n_neg_fi
            + self.n_non_decr
    }
}

impl fmt::Display for FitDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fitting diagnostics:")?;
        writeln!(f, "  Iterations: {}", self.n_iterations)?;
        writeln!(f, "  Solver failures: {}", self.n_dposv)?;
        writeln!(f, "  Margin: {}", self.n_margin)?;
        writeln!(f, "  Negative fi: {}", self.n_neg_fi)?;
        writeln!(f, "  Negative height: {}", self.n_neg_height)?;
        writeln!(f, "  Negative width: {}", self.n_neg_width)?;
        writeln!(f, "  Non-decreasing error: {}", self.n_non_decr)?;
        writeln!(f, "  Non-converged: {}", self.n_non_converged)?;
        writeln!(f, "  Lost: {}", self.n_lost)?;
        Ok(())
    }
}
