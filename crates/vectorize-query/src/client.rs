//! Multi-collection query client.
//!
//! Routes each request to the collections its models live in, issues
//! one sub-request per collection in parallel under a deadline, and
//! merges what comes back: similarity results by ascending distance,
//! point reads by concatenation, counts by summation. A call succeeds
//! as long as at least one sub-request does.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use vectorize_store::{Filter, GetRequest, GetResponse, QueryResponse, StoreError, VectorStore};

use crate::config::QueryConfig;
use crate::error::QueryError;

/// Default per-sub-request deadline.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Fan-out query client over one routing config.
///
/// The client holds the routing map for its whole lifetime; dropping it
/// releases everything, so scoped use gets close-on-all-exit-paths for
/// free. [`MultiCollectionQueryClient::close`] exists for call sites
/// that want the hand-off to be explicit.
pub struct MultiCollectionQueryClient {
    store: Arc<dyn VectorStore>,
    config: QueryConfig,
    deadline: Duration,
}

impl MultiCollectionQueryClient {
    /// Connect by loading a routing config from disk.
    pub fn connect(store: Arc<dyn VectorStore>, config_path: &Path) -> Result<Self, QueryError> {
        let config = QueryConfig::load(config_path)?;
        info!(
            models = config.metadata.total_models,
            collections = config.metadata.total_collections,
            "Query client connected"
        );
        Ok(Self::with_config(store, config))
    }

    /// Build a client around an already-loaded config.
    pub fn with_config(store: Arc<dyn VectorStore>, config: QueryConfig) -> Self {
        Self {
            store,
            config,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Override the per-sub-request deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// The routing config in use.
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Release the client.
    pub fn close(self) {
        debug!("Query client closed");
    }

    /// Similarity query fanned across the routed collections.
    ///
    /// Per query text, results from all collections are merged by
    /// ascending distance and cut to `n_results`.
    pub async fn query(
        &self,
        texts: &[String],
        n_results: usize,
        models: Option<&[String]>,
        filter: Option<&Filter>,
    ) -> Result<QueryResponse, QueryError> {
        if texts.is_empty() {
            return Err(QueryError::InvalidQuery(
                "at least one query text is required".to_string(),
            ));
        }
        let collections = self.config.collections_for_models(models);
        if collections.is_empty() {
            warn!(models = ?models, "No collections routed; returning empty result");
            return Ok(QueryResponse::empty(texts.len()));
        }
        info!(
            collections = collections.len(),
            texts = texts.len(),
            "Fanning query across collections"
        );

        let results = self
            .fan_out(&collections, |store, collection| {
                let texts = texts.to_vec();
                let filter = filter.cloned();
                async move {
                    store
                        .query(&collection, &texts, n_results, filter.as_ref())
                        .await
                }
            })
            .await?;

        let mut merged = QueryResponse::empty(texts.len());
        for query_idx in 0..texts.len() {
            let mut rows: Vec<(f32, String, String, vectorize_types::Metadata)> = Vec::new();
            for response in &results {
                if query_idx >= response.num_queries() {
                    continue;
                }
                for i in 0..response.ids[query_idx].len() {
                    rows.push((
                        response.distances[query_idx][i],
                        response.ids[query_idx][i].clone(),
                        response.documents[query_idx][i].clone(),
                        response.metadatas[query_idx][i].clone(),
                    ));
                }
            }
            rows.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.1.cmp(&b.1))
            });
            for (distance, id, document, metadata) in rows.into_iter().take(n_results) {
                merged.distances[query_idx].push(distance);
                merged.ids[query_idx].push(id);
                merged.documents[query_idx].push(document);
                merged.metadatas[query_idx].push(metadata);
            }
        }
        Ok(merged)
    }

    /// Point read fanned across the routed collections.
    ///
    /// Per-collection reads run unpaged; `limit`/`offset` apply to the
    /// concatenation, in routed collection order.
    pub async fn get(
        &self,
        request: GetRequest,
        models: Option<&[String]>,
    ) -> Result<GetResponse, QueryError> {
        let collections = self.config.collections_for_models(models);
        if collections.is_empty() {
            warn!(models = ?models, "No collections routed; returning empty result");
            return Ok(GetResponse::default());
        }

        let inner = GetRequest {
            ids: request.ids.clone(),
            filter: request.filter.clone(),
            limit: None,
            offset: None,
        };
        let results = self
            .fan_out(&collections, |store, collection| {
                let inner = inner.clone();
                async move { store.get(&collection, inner).await }
            })
            .await?;

        let mut merged = GetResponse::default();
        for response in results {
            merged.ids.extend(response.ids);
            merged.documents.extend(response.documents);
            merged.metadatas.extend(response.metadatas);
        }

        let offset = request.offset.unwrap_or(0);
        let limit = request.limit.unwrap_or(usize::MAX);
        let paged = |v: Vec<String>| -> Vec<String> {
            v.into_iter().skip(offset).take(limit).collect()
        };
        Ok(GetResponse {
            ids: paged(merged.ids),
            documents: paged(merged.documents),
            metadatas: merged.metadatas.into_iter().skip(offset).take(limit).collect(),
        })
    }

    /// Document count summed across the routed collections.
    pub async fn count(
        &self,
        models: Option<&[String]>,
        filter: Option<&Filter>,
    ) -> Result<usize, QueryError> {
        let collections = self.config.collections_for_models(models);
        if collections.is_empty() {
            return Ok(0);
        }
        let results = self
            .fan_out(&collections, |store, collection| {
                let filter = filter.cloned();
                async move { store.count(&collection, filter.as_ref()).await }
            })
            .await?;
        Ok(results.into_iter().sum())
    }

    /// Run one sub-request per collection in parallel under the deadline.
    ///
    /// Failed sub-requests are logged and dropped; only a run where
    /// every sub-request failed is an error.
    async fn fan_out<T, F, Fut>(
        &self,
        collections: &[String],
        make_request: F,
    ) -> Result<Vec<T>, QueryError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn VectorStore>, String) -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let deadline = self.deadline;
        let handles: Vec<_> = collections
            .iter()
            .map(|collection| {
                let fut = make_request(self.store.clone(), collection.clone());
                tokio::spawn(async move {
                    match tokio::time::timeout(deadline, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(StoreError::Timeout(format!(
                            "sub-request exceeded {deadline:?}"
                        ))),
                    }
                })
            })
            .collect();

        let mut successes = Vec::new();
        for (collection, handle) in collections.iter().zip(join_all(handles).await) {
            match handle {
                Ok(Ok(value)) => successes.push(value),
                Ok(Err(e)) => {
                    error!(collection = %collection, error = %e, "Collection sub-request failed")
                }
                Err(join_error) => {
                    error!(collection = %collection, error = %join_error, "Sub-request task failed")
                }
            }
        }
        if successes.is_empty() {
            return Err(QueryError::AllCollectionsFailed(collections.len()));
        }
        Ok(successes)
    }
}
