//! Configuration options for the peak fitting engine.
//!
//! This module defines the tunable constants of the iteration engine: damping
//! schedule, convergence tolerance, AOI hysteresis, step clamping and peak
//! storage growth.

use serde::{Deserialize, Serialize};

use crate::error::{PeakFitError, Result};
use crate::peak::NFITTING;

/// Initial lambda value.
pub const LAMBDASTART: f64 = 1.0;

/// Multiplier for decreasing lambda.
pub const LAMBDADOWN: f64 = 0.75;

/// Maximum lambda value, if we hit this the peak is lost as un-fittable.
pub const LAMBDAMAX: f64 = 1.0e20;

/// Minimum lambda value.
pub const LAMBDAMIN: f64 = 1.0e-3;

/// Multiplier for increasing lambda.
pub const LAMBDAUP: f64 = 4.0;

/// In order to move the AOI or change its size the new value must differ
/// from the old value by at least this much (<= 0.5 is no hysteresis).
pub const HYSTERESIS: f64 = 0.6;

/// Peak storage grows in units of this many peaks.
pub const INCNPEAKS: usize = 500;

/// Maximum number of retries per peak in one Levenberg-Marquardt round.
pub const MAXCYCLES: usize = 10;

/// Method for solving the normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SolverMethod {
    /// In-crate Cholesky decomposition.
    #[default]
    Cholesky,

    /// nalgebra's Cholesky decomposition (requires the `matrix` feature).
    Nalgebra,
}

/// Iteration algorithm used for one fitting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FitStrategy {
    /// Levenberg-Marquardt with per-peak adaptive damping.
    #[default]
    LevenbergMarquardt,

    /// The original undamped, clamped update.
    Original,
}

/// Configuration options for a [`crate::context::FitContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Relative error change below which a peak is converged. Default: 1e-6
    pub tolerance: f64,

    /// Errors at or below this value are treated as an exact fit. Default: 1e-10
    pub error_floor: f64,

    /// Lower clamp for estimated starting heights. Default: 1.0
    pub minimum_height: f64,

    /// Starting clamp values, height and background are relative.
    pub clamp_start: [f64; NFITTING],

    /// Clamp the solver deltas in the Levenberg-Marquardt update. Default: false
    pub use_clamp: bool,

    /// AOI hysteresis in pixels. Default: 0.6
    pub hysteresis: f64,

    /// Initial value for the damping parameter. Default: 1.0
    pub lambda_start: f64,

    /// Factor by which to increase lambda. Default: 4.0
    pub lambda_up: f64,

    /// Factor by which to decrease lambda. Default: 0.75
    pub lambda_down: f64,

    /// Minimum value for lambda. Default: 1e-3
    pub lambda_min: f64,

    /// Maximum value for lambda. Default: 1e20
    pub lambda_max: f64,

    /// Retries per peak and round after the first attempt. Default: 10
    pub max_cycles: usize,

    /// Peak storage increment. Default: 500
    pub storage_increment: usize,

    /// Method to use for solving the normal equations. Default: Cholesky
    pub solver: SolverMethod,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-6,
            error_floor: 1.0e-10,
            minimum_height: 1.0,
            clamp_start: [1.0, 1.0, 0.3, 1.0, 0.3, 1.0, 0.1],
            use_clamp: false,
            hysteresis: HYSTERESIS,
            lambda_start: LAMBDASTART,
            lambda_up: LAMBDAUP,
            lambda_down: LAMBDADOWN,
            lambda_min: LAMBDAMIN,
            lambda_max: LAMBDAMAX,
            max_cycles: MAXCYCLES,
            storage_increment: INCNPEAKS,
            solver: SolverMethod::default(),
        }
    }
}

impl FitConfig {
    /// Create a configuration with the default constants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FitConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the error floor.
    pub fn with_error_floor(mut self, error_floor: f64) -> Self {
        self.error_floor = error_floor;
        self
    }

    /// Set the minimum starting height.
    pub fn with_minimum_height(mut self, minimum_height: f64) -> Self {
        self.minimum_height = minimum_height;
        self
    }

    /// Set the starting clamp values.
    pub fn with_clamp_start(mut self, clamp_start: [f64; NFITTING]) -> Self {
        self.clamp_start = clamp_start;
        self
    }

    /// Enable or disable clamping in the Levenberg-Marquardt update.
    pub fn with_use_clamp(mut self, use_clamp: bool) -> Self {
        self.use_clamp = use_clamp;
        self
    }

    /// Set the AOI hysteresis.
    pub fn with_hysteresis(mut self, hysteresis: f64) -> Self {
        self.hysteresis = hysteresis;
        self
    }

    /// Set the initial lambda.
    pub fn with_lambda_start(mut self, lambda: f64) -> Self {
        self.lambda_start = lambda;
        self
    }

    /// Set the maximum lambda.
    pub fn with_lambda_max(mut self, lambda_max: f64) -> Self {
        self.lambda_max = lambda_max;
        self
    }

    /// Set the number of retries per peak and round.
    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Set the peak storage increment.
    pub fn with_storage_increment(mut self, increment: usize) -> Self {
        self.storage_increment = increment;
        self
    }

    /// Set the method used for solving the normal equations.
    pub fn with_solver(mut self, solver: SolverMethod) -> Self {
        self.solver = solver;
        self
    }

    /// Check that the constants are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) {
            return Err(PeakFitError::InvalidInput(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.lambda_min > 0.0 && self.lambda_min <= self.lambda_start)
            || self.lambda_start > self.lambda_max
        {
            return Err(PeakFitError::InvalidInput(format!(
                "lambda must satisfy 0 < min ({}) <= start ({}) <= max ({})",
                self.lambda_min, self.lambda_start, self.lambda_max
            )));
        }
        if !(self.lambda_up > 1.0) || !(self.lambda_down > 0.0 && self.lambda_down < 1.0) {
            return Err(PeakFitError::InvalidInput(format!(
                "lambda factors out of range: up {}, down {}",
                self.lambda_up, self.lambda_down
            )));
        }
        if self.storage_increment == 0 {
            return Err(PeakFitError::InvalidInput(
                "storage increment must be at least 1".to_string(),
            ));
        }
        if self.clamp_start.iter().any(|c| !(*c > 0.0)) {
            return Err(PeakFitError::InvalidInput(format!(
                "clamp start values must be positive: {:?}",
                self.clamp_start
            )));
        }
        Ok(())
    }
}
