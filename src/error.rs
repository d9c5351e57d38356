use thiserror::Error;

/// Error types for the peakfit-rs library.
///
/// These are the fatal conditions only. Per-peak fitting failures (solver
/// failure, margin violation, negative height, ...) are recovered inside the
/// engine and reported through [`crate::diagnostics::FitDiagnostics`].
#[derive(Error, Debug)]
pub enum PeakFitError {
    /// Error indicating a mismatch in matrix or image dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error indicating a singular (not positive-definite) matrix was encountered.
    #[error("Singular matrix encountered")]
    SingularMatrix,

    /// Error for invalid parameter values or names.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Peak index outside of the current peak list.
    #[error("Peak index {index} out of range (nfit = {nfit})")]
    IndexOutOfRange { index: usize, nfit: usize },

    /// The requested feature was not compiled in.
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for peakfit-rs operations.
pub type Result<T> = std::result::Result<T, PeakFitError>;

impl From<&str> for PeakFitError {
    fn from(s: &str) -> Self {
        PeakFitError::InvalidInput(s.to_string())
    }
}
