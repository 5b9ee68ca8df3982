//! Error type and failure classification for the indexing core.

use thiserror::Error;

use vectorize_manifest::ManifestError;
use vectorize_store::StoreError;
use vectorize_types::ModelError;

/// Closed failure classification driving retry and reporting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network timeouts, rate limiting, transient store unavailability;
    /// eligible for one orchestrator-level retry
    Transient,
    /// Missing credentials, invalid endpoint or request; fatal
    AuthConfig,
    /// A row failed its model schema; fatal for that partition-model
    Validation,
    /// A document stayed over the hard token limit after truncation
    OverLimit,
    /// Upsert rejected duplicate ids; handled inline with one retry
    DuplicateId,
    /// Unreadable source data or corrupted pipeline files; fatal
    DataFormat,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::AuthConfig => "auth_config",
            ErrorClass::Validation => "validation",
            ErrorClass::OverLimit => "over_limit",
            ErrorClass::DuplicateId => "duplicate_id",
            ErrorClass::DataFormat => "data_format",
        }
    }
}

/// Errors raised while indexing partitions.
#[derive(Debug, Error)]
pub enum IndexingError {
    /// Vector store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Model registry or row validation failure
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Manifest bookkeeping failure
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Source CSV could not be parsed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Source bytes are not valid UTF-8 or otherwise unreadable
    #[error("Source format error: {0}")]
    SourceFormat(String),

    /// JSON state (resume, samples) failed to serialize
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error report could not be written
    #[error("Report error: {0}")]
    Report(#[from] serde_yaml::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Atomic rename of staged state failed
    #[error("Failed to persist staged file: {0}")]
    Persist(String),
}

impl IndexingError {
    /// Map this failure onto the closed classification.
    pub fn class(&self) -> ErrorClass {
        match self {
            IndexingError::Store(e) => match e {
                StoreError::DuplicateId { .. } => ErrorClass::DuplicateId,
                StoreError::AuthFailed(_)
                | StoreError::InvalidRequest(_)
                | StoreError::UnknownCollection(_) => ErrorClass::AuthConfig,
                StoreError::RateLimited(_) | StoreError::Transient(_) | StoreError::Timeout(_) => {
                    ErrorClass::Transient
                }
            },
            IndexingError::Model(ModelError::Validation { .. }) => ErrorClass::Validation,
            IndexingError::Model(_) => ErrorClass::AuthConfig,
            IndexingError::Manifest(_) => ErrorClass::AuthConfig,
            IndexingError::Csv(_) | IndexingError::SourceFormat(_) => ErrorClass::DataFormat,
            IndexingError::Serialization(_)
            | IndexingError::Report(_)
            | IndexingError::Io(_)
            | IndexingError::Persist(_) => ErrorClass::DataFormat,
        }
    }

    /// Whether the orchestrator may retry the whole partition once.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
