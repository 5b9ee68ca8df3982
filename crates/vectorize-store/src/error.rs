//! Vector store error taxonomy.

use thiserror::Error;

/// Errors surfaced by a vector store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// One or more ids in an upsert already exist in the collection
    #[error("Duplicate ids rejected by collection: {}", ids.join(", "))]
    DuplicateId { ids: Vec<String> },

    /// Server-side rate limiting
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Transient unavailability (connection reset, 5xx, ...)
    #[error("Transient store error: {0}")]
    Transient(String),

    /// Network deadline exceeded
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Missing or rejected credentials, bad endpoint
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The request itself is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Referenced collection does not exist
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
}

impl StoreError {
    /// Whether the failure is worth one orchestrator-level retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::RateLimited(_) | StoreError::Transient(_) | StoreError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::RateLimited("slow down".into()).is_transient());
        assert!(StoreError::Transient("reset".into()).is_transient());
        assert!(StoreError::Timeout("deadline".into()).is_transient());
        assert!(!StoreError::AuthFailed("no key".into()).is_transient());
        assert!(!StoreError::InvalidRequest("bad".into()).is_transient());
        assert!(!StoreError::DuplicateId { ids: vec![] }.is_transient());
    }
}
