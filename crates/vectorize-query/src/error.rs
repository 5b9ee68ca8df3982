//! Error type for query configuration and fan-out.

use thiserror::Error;

use vectorize_store::StoreError;

/// Errors raised by the query layer.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Query config file missing, malformed, or structurally wrong
    #[error("Query config error: {0}")]
    Config(String),

    /// Every routed sub-request failed
    #[error("All {0} collection sub-requests failed")]
    AllCollectionsFailed(usize),

    /// Request is malformed (no query texts, ...)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Underlying store failure surfaced when nothing succeeded
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error reading or writing the query config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
