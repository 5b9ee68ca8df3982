//! Query routing configuration.
//!
//! Built by scanning every partition's resume files under the output
//! root, the config is a bidirectional model-collection map consumed by
//! the fan-out client. Models that never started or indexed nothing are
//! excluded; malformed resume files are skipped with a warning.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::QueryError;

/// Suffix of resume files inside partition directories.
const RESUME_FILE_SUFFIX: &str = "_resume_state.json";

/// Routing entry for one model.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelCollections {
    /// Collections holding this model's documents, sorted
    pub collections: Vec<String>,
    /// Documents across those collections
    pub total_documents: u64,
    /// Partitions the documents came from, sorted
    pub partitions: Vec<String>,
}

/// Generation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfigMetadata {
    pub total_collections: usize,
    pub total_models: usize,
    pub generated_at: DateTime<Utc>,
    /// Output root the config was generated from
    pub out_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_prefix: Option<String>,
}

/// Bidirectional model-collection routing map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub model_to_collections: BTreeMap<String, ModelCollections>,
    pub collection_to_models: BTreeMap<String, Vec<String>>,
    pub metadata: QueryConfigMetadata,
}

impl QueryConfig {
    /// Load a config file, checking the required keys exist.
    pub fn load(path: &Path) -> Result<Self, QueryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: QueryConfig = serde_json::from_str(&raw)
            .map_err(|e| QueryError::Config(format!("malformed {}: {e}", path.display())))?;
        Ok(config)
    }

    /// Write the config atomically.
    pub fn save(&self, path: &Path) -> Result<(), QueryError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut staged = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut staged, self)?;
        staged.write_all(b"\n")?;
        staged
            .persist(path)
            .map_err(|e| QueryError::Config(format!("cannot persist config: {e}")))?;
        info!(path = %path.display(), "Query config written");
        Ok(())
    }

    /// Collections to fan a request across.
    ///
    /// `None` or an empty list routes to every known collection; unknown
    /// model names are logged and contribute nothing.
    pub fn collections_for_models(&self, models: Option<&[String]>) -> Vec<String> {
        match models {
            None | Some([]) => self.collection_to_models.keys().cloned().collect(),
            Some(models) => {
                let mut collections = BTreeSet::new();
                for model in models {
                    match self.model_to_collections.get(model) {
                        Some(entry) => collections.extend(entry.collections.iter().cloned()),
                        None => {
                            warn!(model = %model, "Model not present in query config; skipping")
                        }
                    }
                }
                collections.into_iter().collect()
            }
        }
    }
}

/// Build a query config by scanning resume files under `out_root`.
pub fn build_query_config(
    out_root: &Path,
    collection_prefix: Option<&str>,
) -> Result<QueryConfig, QueryError> {
    if !out_root.is_dir() {
        return Err(QueryError::Config(format!(
            "output root {} does not exist or is not a directory",
            out_root.display()
        )));
    }

    let mut model_to_collections: BTreeMap<String, ModelCollections> = BTreeMap::new();
    let mut collection_to_models: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut all_collections: BTreeSet<String> = BTreeSet::new();

    let mut partition_dirs: Vec<_> = std::fs::read_dir(out_root)?
        .flatten()
        .filter(|e| e.path().is_dir())
        .collect();
    partition_dirs.sort_by_key(|e| e.file_name());
    if partition_dirs.is_empty() {
        warn!(out_root = %out_root.display(), "No partition directories found");
    }

    for dir in partition_dirs {
        let partition_name = dir.file_name().to_string_lossy().to_string();
        let Ok(files) = std::fs::read_dir(dir.path()) else {
            continue;
        };
        for file in files.flatten() {
            let file_name = file.file_name().to_string_lossy().to_string();
            let Some(collection) = file_name.strip_suffix(RESUME_FILE_SUFFIX) else {
                continue;
            };
            let collection = collection.to_string();

            let parsed: Value = match std::fs::read_to_string(file.path())
                .map_err(QueryError::from)
                .and_then(|raw| serde_json::from_str(&raw).map_err(QueryError::from))
            {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(path = %file.path().display(), error = %e, "Skipping unreadable resume file");
                    continue;
                }
            };
            let Value::Object(entries) = parsed else {
                warn!(path = %file.path().display(), "Resume file is not a JSON object; skipping");
                continue;
            };

            all_collections.insert(collection.clone());
            for (model_name, model_state) in entries {
                let Value::Object(state) = model_state else {
                    continue;
                };
                let started = state
                    .get("started")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let collection_count = state
                    .get("collection_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if !started || collection_count == 0 {
                    debug!(
                        model = %model_name,
                        partition = %partition_name,
                        "Excluding model with no indexed documents"
                    );
                    continue;
                }

                let entry = model_to_collections.entry(model_name.clone()).or_default();
                if !entry.collections.contains(&collection) {
                    entry.collections.push(collection.clone());
                }
                entry.total_documents += collection_count;
                if !entry.partitions.contains(&partition_name) {
                    entry.partitions.push(partition_name.clone());
                }
                collection_to_models
                    .entry(collection.clone())
                    .or_default()
                    .insert(model_name);
            }
        }
    }

    for entry in model_to_collections.values_mut() {
        entry.collections.sort();
        entry.partitions.sort();
    }

    let config = QueryConfig {
        metadata: QueryConfigMetadata {
            total_collections: all_collections.len(),
            total_models: model_to_collections.len(),
            generated_at: Utc::now(),
            out_root: out_root.display().to_string(),
            collection_prefix: collection_prefix.map(|p| p.to_string()),
        },
        model_to_collections,
        collection_to_models: collection_to_models
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect(),
    };
    info!(
        models = config.metadata.total_models,
        collections = config.metadata.total_collections,
        "Built query config"
    );
    Ok(config)
}
