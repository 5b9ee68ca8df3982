//! Store-side maintenance: stale-partition cleanup and drop application.
//!
//! How data leaves the store depends on the collection strategy: the
//! per-partition strategy drops whole collections, the single strategy
//! deletes metadata-filter slices.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use vectorize_manifest::{DropPlan, Manifest, ManifestStore};
use vectorize_store::{Filter, VectorStore};
use vectorize_types::{meta_keys, MetadataValue};

use crate::collection::CollectionStrategy;
use crate::error::IndexingError;

/// Remove stale partitions' data from the store before reindexing.
///
/// Returns the names of partitions whose data was removed.
pub async fn delete_stale_partitions(
    store: &Arc<dyn VectorStore>,
    strategy: &CollectionStrategy,
    manifest: &Manifest,
) -> Result<Vec<String>, IndexingError> {
    let mut cleaned = Vec::new();
    for entry in manifest.partitions.iter().filter(|p| p.stale) {
        let collection = strategy.collection_for(&entry.name);
        if strategy.drops_whole_collections() {
            let existed = store.drop_collection(&collection).await?;
            info!(
                partition = %entry.name,
                collection = %collection,
                existed = existed,
                "Dropped stale partition collection"
            );
        } else {
            let filter = Filter::Eq(
                meta_keys::PARTITION_NAME.to_string(),
                MetadataValue::Str(entry.name.clone()),
            );
            let removed = store.delete(&collection, &filter).await?;
            info!(
                partition = %entry.name,
                collection = %collection,
                removed = removed,
                "Deleted stale partition slice"
            );
        }
        cleaned.push(entry.name.clone());
    }
    Ok(cleaned)
}

/// Effect of a drop plan on one model-partition pair.
#[derive(Debug, Clone)]
pub struct DropEffect {
    pub model: String,
    pub partition: String,
    pub collection: String,
    /// Documents removed; zero on dry runs
    pub removed: usize,
    pub reason: Option<String>,
}

/// Metadata filter selecting one model's slice of a drop plan.
fn drop_filter(model: &str, partitions: &[String], schema_versions: &[u32]) -> Filter {
    let mut clauses = vec![Filter::Eq(
        meta_keys::MODEL_NAME.to_string(),
        MetadataValue::Str(model.to_string()),
    )];
    clauses.push(Filter::In(
        meta_keys::PARTITION_NAME.to_string(),
        partitions
            .iter()
            .map(|p| MetadataValue::Str(p.clone()))
            .collect(),
    ));
    if !schema_versions.is_empty() {
        clauses.push(Filter::In(
            meta_keys::SCHEMA_VERSION.to_string(),
            schema_versions
                .iter()
                .map(|v| MetadataValue::Int(*v as i64))
                .collect(),
        ));
    }
    Filter::and(clauses)
}

/// Apply a drop plan to the store and record it in the manifest.
///
/// With `apply=false` this is a dry run: effects are computed and
/// returned but neither the store nor the manifest changes.
pub async fn apply_drop_plan(
    store: &Arc<dyn VectorStore>,
    strategy: &CollectionStrategy,
    manifest_store: &ManifestStore,
    plan: &DropPlan,
    plan_path: &Path,
    performed_by: &str,
    apply: bool,
) -> Result<Vec<DropEffect>, IndexingError> {
    let manifest = manifest_store.read()?;
    let mut effects = Vec::new();
    let mut affected: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut reason: Option<String> = None;

    for (model, model_plan) in &plan.models {
        reason = reason.or_else(|| model_plan.reason.clone());
        for partition in &model_plan.partitions {
            if manifest.partition(partition).is_none() {
                warn!(
                    partition = %partition,
                    "Drop plan references a partition missing from the manifest; skipping"
                );
                continue;
            }
            let collection = strategy.collection_for(partition);
            let filter = drop_filter(
                model,
                std::slice::from_ref(partition),
                &model_plan.schema_versions,
            );
            let removed = if apply {
                store.delete(&collection, &filter).await?
            } else {
                0
            };
            effects.push(DropEffect {
                model: model.clone(),
                partition: partition.clone(),
                collection,
                removed,
                reason: model_plan.reason.clone(),
            });
            affected
                .entry(model.clone())
                .or_default()
                .push(partition.clone());
        }
    }

    if apply && !affected.is_empty() {
        manifest_store.mark_deleted(
            &affected,
            reason.as_deref(),
            performed_by,
            &plan_path.display().to_string(),
        )?;
        info!(
            models = affected.len(),
            effects = effects.len(),
            "Applied drop plan"
        );
    }
    Ok(effects)
}
