//! Error types for the nodal simulation engine.
//!
//! This module provides a unified error type [`NodalError`] covering the
//! structural errors raised on caller misuse and the recoverable numerical
//! conditions (singular matrix, non-convergence, timestep underflow) that the
//! engine reports instead of tolerating silently.

use thiserror::Error;

/// Result type alias using [`NodalError`].
pub type Result<T> = std::result::Result<T, NodalError>;

/// Unified error type for all engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodalError {
    // ============ Structural Errors ============
    /// Index outside the valid range of a matrix, vector or history
    #[error("Index {index} out of range (size {size})")]
    IndexOutOfRange { index: usize, size: usize },

    /// Invalid argument passed to an engine call
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A device was connected with the wrong number of pins
    #[error("Pin count mismatch for '{device}': {expected} pins expected, {given} given")]
    PinCountMismatch {
        device: String,
        expected: usize,
        given: usize,
    },

    /// Two entities share the same name
    #[error("Duplicate entity name '{name}'")]
    DuplicateEntity { name: String },

    /// An unknown with this name is already registered
    #[error("Duplicate unknown '{name}'")]
    DuplicateUnknown { name: String },

    /// Lookup of an unregistered unknown
    #[error("Unknown '{name}' not found")]
    UnknownNotFound { name: String },

    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    // ============ Numerical Errors ============
    /// No usable pivot could be found
    #[error("Singular matrix at elimination step {step} - circuit may have a short circuit or floating node")]
    SingularMatrix { step: usize },

    /// Newton-Raphson iteration did not converge
    #[error("Newton-Raphson did not converge after {iterations} iterations")]
    ConvergenceFailure { iterations: usize },

    /// Non-finite value in the solution
    #[error("Numerical overflow detected for unknown {index} (value: {value:.2e})")]
    NumericalOverflow { index: usize, value: f64 },

    /// Timestep shrank below the minimum after repeated rejections
    #[error("Timestep too small at time {time:.6e}s (delta: {delta:.3e}s)")]
    TimestepTooSmall { time: f64, delta: f64 },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },
}

impl NodalError {
    /// Create an index out of range error
    pub fn out_of_range(index: usize, size: usize) -> Self {
        Self::IndexOutOfRange { index, size }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a pin count mismatch error
    pub fn pin_count(device: impl Into<String>, expected: usize, given: usize) -> Self {
        Self::PinCountMismatch {
            device: device.into(),
            expected,
            given,
        }
    }

    /// Create a singular matrix error
    pub fn singular(step: usize) -> Self {
        Self::SingularMatrix { step }
    }

    /// Create a convergence failure error
    pub fn convergence_failure(iterations: usize) -> Self {
        Self::ConvergenceFailure { iterations }
    }

    /// Create an invalid simulation parameter error
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Whether this error signals caller misuse rather than a numerical condition.
    ///
    /// Structural errors are fatal to the call; everything else may be
    /// recovered from by damping, stepping or shrinking the timestep.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::IndexOutOfRange { .. }
                | Self::InvalidArgument { .. }
                | Self::PinCountMismatch { .. }
                | Self::DuplicateEntity { .. }
                | Self::DuplicateUnknown { .. }
                | Self::UnknownNotFound { .. }
                | Self::InvalidTopology { .. }
                | Self::InvalidSimulationParam { .. }
        )
    }
}
