//! Error types shared across the vectorize pipeline.

use thiserror::Error;

/// Unified error type for model registry and schema operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema description is malformed or inconsistent
    #[error("Schema error for model '{model}': {message}")]
    Schema { model: String, message: String },

    /// A row failed validation against its model schema
    #[error("Validation failed for model '{model}' field '{field}': {message}")]
    Validation {
        model: String,
        field: String,
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while reading registry or configuration files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Referenced model is not present in the registry
    #[error("Unknown model: {0}")]
    UnknownModel(String),
}
