// src/error.rs

//! Error types for the ISA crate.

use thiserror::Error;

/// Errors that can occur while fitting or sampling ISA and GSM models.
#[derive(Debug, Clone, Error)]
pub enum IsaError {
    /// Input is malformed: wrong dimensionality, empty data, bad shapes.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of what is wrong with the input.
        message: String,
    },

    /// A numerical degeneracy was encountered at runtime.
    #[error("Numerical error: {message}")]
    NumericalError {
        /// Description of what went wrong.
        message: String,
    },

    /// A singular matrix was encountered where an inverse was required.
    #[error("Singular matrix encountered during computation")]
    SingularMatrix,

    /// Invalid configuration parameter.
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why it's invalid.
        message: String,
    },
}

impl IsaError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        IsaError::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn numerical(message: impl Into<String>) -> Self {
        IsaError::NumericalError {
            message: message.into(),
        }
    }

    /// Whether this error stems from numerical degeneracy rather than bad input.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            IsaError::NumericalError { .. } | IsaError::SingularMatrix
        )
    }
}

/// Convenience type alias for Results with IsaError.
pub type Result<T> = std::result::Result<T, IsaError>;
