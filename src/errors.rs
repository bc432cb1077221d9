//! Shared error types used across submodules.

use thiserror::Error;

use crate::backend::solver::SolverError;

/// Top-level error type for the crate.
#[derive(Debug, Error)]
pub enum LinssError {
    /// Raised when matrix or gain shapes disagree.
    #[error("dimension mismatch in {operation}: {detail}")]
    DimensionMismatch {
        /// Operation that detected the mismatch.
        operation: &'static str,
        /// Which dimensions disagreed.
        detail: String,
    },
    /// Raised when two models with different sampling intervals are combined.
    #[error("sampling interval mismatch in {operation}: {first:?} vs {second:?}")]
    SamplingMismatch {
        /// Operation that detected the mismatch.
        operation: &'static str,
        /// Sampling interval of the first operand (`None` is continuous-time).
        first: Option<f64>,
        /// Sampling interval of the second operand.
        second: Option<f64>,
    },
    /// Raised when an argument is outside its admissible range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Raised for explicitly unsupported code paths.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    /// Raised when a factorization or inversion meets a singular matrix.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
    /// Raised when a computed quantity breaks an internal invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// Wraps sparse solver errors.
    #[error(transparent)]
    Solver(#[from] SolverError),
}

impl LinssError {
    pub(crate) fn dims(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            operation,
            detail: detail.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LinssError>;
