//! The abstract vector store client.
//!
//! Backends implement [`VectorStore`]; everything above it (indexer,
//! query client, drop apply) is backend-agnostic. A single `upsert`
//! call is atomic: it either applies all of its documents or none.

use async_trait::async_trait;

use vectorize_types::Metadata;

use crate::error::StoreError;
use crate::filter::Filter;

/// Column-wise result of a similarity query, one inner vec per query text.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub ids: Vec<Vec<String>>,
    pub distances: Vec<Vec<f32>>,
    pub documents: Vec<Vec<String>>,
    pub metadatas: Vec<Vec<Metadata>>,
}

impl QueryResponse {
    /// Empty response shaped for `num_queries` query texts.
    pub fn empty(num_queries: usize) -> Self {
        Self {
            ids: vec![Vec::new(); num_queries],
            distances: vec![Vec::new(); num_queries],
            documents: vec![Vec::new(); num_queries],
            metadatas: vec![Vec::new(); num_queries],
        }
    }

    /// Number of query texts this response covers.
    pub fn num_queries(&self) -> usize {
        self.ids.len()
    }
}

/// Column-wise result of a point read.
#[derive(Debug, Clone, Default)]
pub struct GetResponse {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

impl GetResponse {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Selection for a point read.
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    /// Restrict to these ids
    pub ids: Option<Vec<String>>,
    /// Restrict by metadata
    pub filter: Option<Filter>,
    /// Page size
    pub limit: Option<usize>,
    /// Page start
    pub offset: Option<usize>,
}

/// Abstract vector database client.
///
/// Implementations must be safe for concurrent use; collection-level
/// concurrency control is the backend's concern.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ensure a collection exists, creating it if needed.
    async fn get_or_create_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Atomically insert-or-replace documents.
    ///
    /// `ids`, `texts`, and `metadatas` are parallel columns of equal
    /// length. Backends that refuse duplicate ids report them through
    /// [`StoreError::DuplicateId`].
    async fn upsert(
        &self,
        collection: &str,
        ids: &[String],
        texts: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), StoreError>;

    /// Delete documents matching the filter; returns how many went away.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError>;

    /// Drop an entire collection; returns whether it existed.
    async fn drop_collection(&self, name: &str) -> Result<bool, StoreError>;

    /// Nearest-neighbour query for each text.
    async fn query(
        &self,
        collection: &str,
        texts: &[String],
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<QueryResponse, StoreError>;

    /// Point read by ids and/or metadata filter.
    async fn get(&self, collection: &str, request: GetRequest) -> Result<GetResponse, StoreError>;

    /// Count documents, optionally restricted by a filter.
    async fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize, StoreError>;
}
