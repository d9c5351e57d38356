//! Peak status and convergence criteria.
//!
//! Every peak carries a [`PeakStatus`]. Peaks start out `Running`; the
//! iteration engine moves them to `Converged` when the relative change of
//! their error drops below the tolerance, or to `Error` when they can no
//! longer be fit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PeakFitError, Result};

/// Possible fitting states of a peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PeakStatus {
    /// The peak is still being fit.
    #[default]
    Running,

    /// The peak error stopped changing.
    Converged,

    /// The peak could not be fit and is no longer part of the fit image.
    Error,
}

impl PeakStatus {
    /// Returns true if the peak is no longer iterated.
    pub fn is_terminated(&self) -> bool {
        !matches!(self, PeakStatus::Running)
    }

    /// Returns true if the peak has converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, PeakStatus::Converged)
    }

    /// Integer code used by status arrays (0 running, 1 converged, 2 error).
    pub fn code(&self) -> i32 {
        match self {
            PeakStatus::Running => 0,
            PeakStatus::Converged => 1,
            PeakStatus::Error => 2,
        }
    }

    /// Inverse of [`PeakStatus::code`].
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(PeakStatus::Running),
            1 => Ok(PeakStatus::Converged),
            2 => Ok(PeakStatus::Error),
            other => Err(PeakFitError::InvalidParameter(format!(
                "unknown peak status code {}",
                other
            ))),
        }
    }

    /// Returns a description of the status.
    pub fn description(&self) -> &'static str {
        match self {
            PeakStatus::Running => "still fitting",
            PeakStatus::Converged => "converged: error stopped changing",
            PeakStatus::Error => "lost: peak could not be fit",
        }
    }
}

impl fmt::Display for PeakStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeakStatus::Running => "RUNNING",
            PeakStatus::Converged => "CONVERGED",
            PeakStatus::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Relative change between the previous and the new error.
///
/// Identical errors have zero change, even when both are zero.
pub fn relative_change(old_error: f64, new_error: f64) -> f64 {
    let delta = (new_error - old_error).abs();
    if delta == 0.0 {
        0.0
    } else {
        delta / new_error.abs()
    }
}

/// Criteria for deciding that a peak has converged.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceCriteria {
    /// Tolerance for the relative change in error.
    pub tolerance: f64,

    /// Errors at or below this value count as an exact fit.
    pub error_floor: f64,
}

impl ConvergenceCriteria {
    /// Creates new criteria.
    pub fn new(tolerance: f64, error_floor: f64) -> Self {
        Self {
            tolerance,
            error_floor,
        }
    }

    /// Checks whether going from `old_error` to `new_error` counts as converged.
    pub fn check(&self, old_error: f64, new_error: f64) -> bool {
        new_error <= self.error_floor || relative_change(old_error, new_error) < self.tolerance
    }
}
