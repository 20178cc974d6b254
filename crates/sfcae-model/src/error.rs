//! Error types for model construction and batch assembly.
//!
//! Configuration problems are rejected eagerly when the model or a batch is
//! built; forward passes themselves are pure tensor computations and do not
//! produce recoverable errors.

use thiserror::Error;

/// Main error type for the autoencoder crate.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Invalid model configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A snapshot batch violates the data contract.
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// Error from the index/length-adaptation primitives.
    #[error(transparent)]
    Core(#[from] sfcae_core::CoreError),
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    /// Create an invalid-configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        ModelError::InvalidConfiguration(msg.into())
    }

    /// Create an invalid-batch error.
    pub fn batch(msg: impl Into<String>) -> Self {
        ModelError::InvalidBatch(msg.into())
    }
}
