//! In-memory vector store backend.
//!
//! Serves local runs and the test suites: deterministic word-overlap
//! distances instead of a real embedding space, plus injectable failure
//! modes so indexer and query-client error paths can be exercised
//! without a server.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use vectorize_types::Metadata;

use crate::client::{GetRequest, GetResponse, QueryResponse, VectorStore};
use crate::error::StoreError;
use crate::filter::Filter;

#[derive(Debug, Clone)]
struct StoredDoc {
    text: String,
    metadata: Metadata,
}

type CollectionMap = BTreeMap<String, BTreeMap<String, StoredDoc>>;

/// In-memory [`VectorStore`] implementation.
#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<CollectionMap>,
    upsert_calls: AtomicUsize,
    /// Upsert calls from this count onward fail with a transient error
    fail_upserts_from: Mutex<Option<usize>>,
    /// Per-collection variant: collection name to (calls so far, fail-from)
    fail_upserts_in: Mutex<BTreeMap<String, (usize, usize)>>,
    /// Collections whose queries always fail
    failing_collections: Mutex<HashSet<String>>,
    /// Refuse ids that already exist instead of replacing them
    reject_duplicates: Mutex<bool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the Nth upsert call (1-based) and all later ones fail
    /// with a transient error.
    pub fn fail_upserts_from(&self, call: usize) {
        *self.fail_upserts_from.lock().unwrap_or_else(|e| e.into_inner()) = Some(call);
    }

    /// Make the Nth upsert against `collection` (1-based, counted per
    /// collection) and all later ones fail with a transient error.
    pub fn fail_upserts_in(&self, collection: &str, from_call: usize) {
        self.fail_upserts_in
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(collection.to_string(), (0, from_call));
    }

    /// Clear any injected upsert failure.
    pub fn clear_upsert_failures(&self) {
        *self.fail_upserts_from.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.fail_upserts_in
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Make queries against `collection` fail.
    pub fn fail_collection(&self, collection: &str) {
        self.failing_collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(collection.to_string());
    }

    /// Report duplicate ids in an upsert instead of replacing them.
    pub fn reject_duplicates(&self, enabled: bool) {
        *self.reject_duplicates.lock().unwrap_or_else(|e| e.into_inner()) = enabled;
    }

    /// How many upsert calls were attempted.
    pub fn upsert_call_count(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of document ids in a collection (test helper).
    pub fn collection_ids(&self, collection: &str) -> Vec<String> {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of all existing collections.
    pub fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.keys().cloned().collect()
    }

    fn check_query_failure(&self, collection: &str) -> Result<(), StoreError> {
        let failing = self
            .failing_collections
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if failing.contains(collection) {
            return Err(StoreError::Transient(format!(
                "injected failure for collection '{collection}'"
            )));
        }
        Ok(())
    }
}

/// Lowercased alphanumeric word set used as a stand-in embedding.
fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Distance in [0, 1]: one minus the Jaccard overlap of word sets.
fn distance(query: &HashSet<String>, doc: &HashSet<String>) -> f32 {
    if query.is_empty() && doc.is_empty() {
        return 0.0;
    }
    let intersection = query.intersection(doc).count() as f32;
    let union = (query.len() + doc.len()) as f32 - intersection;
    if union == 0.0 {
        1.0
    } else {
        1.0 - intersection / union
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        ids: &[String],
        texts: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), StoreError> {
        if ids.len() != texts.len() || ids.len() != metadatas.len() {
            return Err(StoreError::InvalidRequest(
                "ids, texts, and metadatas must have equal length".to_string(),
            ));
        }
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(from) = *self.fail_upserts_from.lock().unwrap_or_else(|e| e.into_inner()) {
            if call >= from {
                return Err(StoreError::Transient(format!(
                    "injected upsert failure on call {call}"
                )));
            }
        }
        {
            let mut per_collection = self
                .fail_upserts_in
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some((calls, from)) = per_collection.get_mut(collection) {
                *calls += 1;
                if *calls >= *from {
                    return Err(StoreError::Transient(format!(
                        "injected upsert failure on {collection} call {calls}"
                    )));
                }
            }
        }

        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        if *self.reject_duplicates.lock().unwrap_or_else(|e| e.into_inner()) {
            let duplicates: Vec<String> = ids
                .iter()
                .filter(|id| docs.contains_key(*id))
                .cloned()
                .collect();
            if !duplicates.is_empty() {
                return Err(StoreError::DuplicateId { ids: duplicates });
            }
        }

        // Per-call atomicity: validation above happens before any write.
        for ((id, text), metadata) in ids.iter().zip(texts).zip(metadatas) {
            docs.insert(
                id.clone(),
                StoredDoc {
                    text: text.clone(),
                    metadata: metadata.clone(),
                },
            );
        }
        debug!(collection = %collection, count = ids.len(), "Upserted documents");
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        let doomed: Vec<String> = docs
            .iter()
            .filter(|(_, doc)| filter.matches(&doc.metadata))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            docs.remove(id);
        }
        Ok(doomed.len())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        Ok(collections.remove(name).is_some())
    }

    async fn query(
        &self,
        collection: &str,
        texts: &[String],
        n_results: usize,
        filter: Option<&Filter>,
    ) -> Result<QueryResponse, StoreError> {
        self.check_query_failure(collection)?;
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let docs = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let mut response = QueryResponse::empty(texts.len());
        for (qi, text) in texts.iter().enumerate() {
            let query_words = word_set(text);
            let mut scored: Vec<(f32, &String, &StoredDoc)> = docs
                .iter()
                .filter(|(_, doc)| filter.is_none_or(|f| f.matches(&doc.metadata)))
                .map(|(id, doc)| (distance(&query_words, &word_set(&doc.text)), id, doc))
                .collect();
            scored.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.1.cmp(b.1))
            });
            for (dist, id, doc) in scored.into_iter().take(n_results) {
                response.distances[qi].push(dist);
                response.ids[qi].push(id.clone());
                response.documents[qi].push(doc.text.clone());
                response.metadatas[qi].push(doc.metadata.clone());
            }
        }
        Ok(response)
    }

    async fn get(&self, collection: &str, request: GetRequest) -> Result<GetResponse, StoreError> {
        self.check_query_failure(collection)?;
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let docs = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let id_set: Option<HashSet<&String>> =
            request.ids.as_ref().map(|ids| ids.iter().collect());

        let mut selected: Vec<(&String, &StoredDoc)> = docs
            .iter()
            .filter(|(id, doc)| {
                id_set.as_ref().is_none_or(|set| set.contains(id))
                    && request.filter.as_ref().is_none_or(|f| f.matches(&doc.metadata))
            })
            .collect();
        selected.sort_by(|a, b| a.0.cmp(b.0));

        let offset = request.offset.unwrap_or(0);
        let limit = request.limit.unwrap_or(usize::MAX);
        let mut response = GetResponse::default();
        for (id, doc) in selected.into_iter().skip(offset).take(limit) {
            response.ids.push(id.clone());
            response.documents.push(doc.text.clone());
            response.metadatas.push(doc.metadata.clone());
        }
        Ok(response)
    }

    async fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize, StoreError> {
        self.check_query_failure(collection)?;
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let docs = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        Ok(docs
            .values()
            .filter(|doc| filter.is_none_or(|f| f.matches(&doc.metadata)))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(model: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("model_name".to_string(), model.into());
        m
    }

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.get_or_create_collection("c1").await.unwrap();
        store
            .upsert(
                "c1",
                &["a".to_string(), "b".to_string()],
                &[
                    "rust borrow checker".to_string(),
                    "python garbage collector".to_string(),
                ],
                &[meta("Table"), meta("Field")],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_and_count() {
        let store = seeded_store().await;
        assert_eq!(store.count("c1", None).await.unwrap(), 2);
        let only_table = Filter::Eq("model_name".into(), "Table".into());
        assert_eq!(store.count("c1", Some(&only_table)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let store = seeded_store().await;
        let response = store
            .query("c1", &["rust borrow checker".to_string()], 2, None)
            .await
            .unwrap();
        assert_eq!(response.ids[0], vec!["a".to_string(), "b".to_string()]);
        assert!(response.distances[0][0] < response.distances[0][1]);
    }

    #[tokio::test]
    async fn test_get_paging() {
        let store = seeded_store().await;
        let response = store
            .get(
                "c1",
                GetRequest {
                    limit: Some(1),
                    offset: Some(1),
                    ..GetRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(response.ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_by_filter() {
        let store = seeded_store().await;
        let removed = store
            .delete("c1", &Filter::Eq("model_name".into(), "Table".into()))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.collection_ids("c1"), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_rejection() {
        let store = seeded_store().await;
        store.reject_duplicates(true);
        let err = store
            .upsert(
                "c1",
                &["a".to_string(), "c".to_string()],
                &["x".to_string(), "y".to_string()],
                &[meta("Table"), meta("Table")],
            )
            .await
            .unwrap_err();
        match err {
            StoreError::DuplicateId { ids } => assert_eq!(ids, vec!["a".to_string()]),
            other => panic!("expected DuplicateId, got {other}"),
        }
        // Atomicity: the non-duplicate id must not have been written.
        assert_eq!(store.collection_ids("c1").len(), 2);
    }

    #[tokio::test]
    async fn test_injected_upsert_failure() {
        let store = seeded_store().await;
        store.fail_upserts_from(2);
        let err = store
            .upsert("c1", &["z".to_string()], &["t".to_string()], &[meta("Table")])
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let store = InMemoryStore::new();
        let err = store.count("nope", None).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownCollection(_)));
    }
}
