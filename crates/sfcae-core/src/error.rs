//! Error types for the SFC index and length-adaptation primitives.
//!
//! Everything in this crate is pure index arithmetic, so errors only arise
//! from malformed construction inputs and are reported eagerly at build time
//! rather than surfacing as gather failures inside a forward pass.

use thiserror::Error;

/// Main error type for core index/length computations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An integer array was expected to be a permutation of `0..len` but is not.
    #[error("Invalid permutation: {0}")]
    InvalidPermutation(String),

    /// A length pair fell outside the supported range.
    #[error("Length mismatch: {0}")]
    LengthMismatch(String),

    /// Dimension mismatch between a grid shape and an offset set.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an invalid-configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        CoreError::InvalidConfiguration(msg.into())
    }

    /// Create an invalid-permutation error.
    pub fn permutation(msg: impl Into<String>) -> Self {
        CoreError::InvalidPermutation(msg.into())
    }

    /// Create a length-mismatch error.
    pub fn length(msg: impl Into<String>) -> Self {
        CoreError::LengthMismatch(msg.into())
    }
}
