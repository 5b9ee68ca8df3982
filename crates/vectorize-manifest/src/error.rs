//! Error type for manifest operations.

use thiserror::Error;

/// Errors raised by the manifest store and drop planning.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file content is structurally invalid
    #[error("Invalid manifest: {0}")]
    Invalid(String),

    /// A referenced partition does not exist
    #[error("Unknown partition: {0}")]
    UnknownPartition(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error reading or staging the manifest file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Atomic rename of the staged file failed
    #[error("Failed to persist staged file: {0}")]
    Persist(String),
}
