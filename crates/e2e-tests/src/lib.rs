//! Shared harness for the end-to-end pipeline tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use vectorize_manifest::{ManifestStore, NewPartitionModel, PartitionEntry};
use vectorize_store::InMemoryStore;
use vectorize_tokens::TokenCounter;
use vectorize_types::{
    CollectionStrategyKind, FieldDef, FieldKind, ModelRegistry, ModelSpec, Schema, Settings,
};

/// Spec for the `Table` model used across the tests.
pub fn table_spec() -> ModelSpec {
    ModelSpec {
        name: "Table".to_string(),
        schema: Schema {
            fields: vec![
                FieldDef {
                    name: "table_name".to_string(),
                    kind: FieldKind::String,
                    required: true,
                },
                FieldDef {
                    name: "description".to_string(),
                    kind: FieldKind::String,
                    required: false,
                },
                FieldDef {
                    name: "row_count".to_string(),
                    kind: FieldKind::Integer,
                    required: false,
                },
            ],
        },
        semantic_fields: vec!["table_name".to_string(), "description".to_string()],
        keyword_fields: vec!["table_name".to_string()],
        key_fields: vec!["table_name".to_string()],
        truncation_strategy: None,
        columns: BTreeMap::new(),
    }
}

/// Spec for the `Field` model used across the tests.
pub fn field_spec() -> ModelSpec {
    ModelSpec {
        name: "Field".to_string(),
        schema: Schema {
            fields: vec![
                FieldDef {
                    name: "field_name".to_string(),
                    kind: FieldKind::String,
                    required: true,
                },
                FieldDef {
                    name: "table_name".to_string(),
                    kind: FieldKind::String,
                    required: true,
                },
                FieldDef {
                    name: "description".to_string(),
                    kind: FieldKind::String,
                    required: false,
                },
            ],
        },
        semantic_fields: vec!["description".to_string()],
        keyword_fields: vec!["table_name".to_string()],
        key_fields: vec!["table_name".to_string(), "field_name".to_string()],
        truncation_strategy: None,
        columns: BTreeMap::new(),
    }
}

/// Everything one pipeline test needs: temp dirs, store, registry,
/// manifest, and settings tuned for small deterministic runs.
pub struct TestHarness {
    pub dir: TempDir,
    pub store: Arc<InMemoryStore>,
    pub registry: Arc<ModelRegistry>,
    pub manifest_store: ManifestStore,
    pub counter: Arc<TokenCounter>,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let manifest_store = ManifestStore::new(dir.path().join("manifest.json"));
        let registry =
            ModelRegistry::from_specs(vec![table_spec(), field_spec()]).expect("registry");
        Self {
            dir,
            store: Arc::new(InMemoryStore::new()),
            registry: Arc::new(registry),
            manifest_store,
            counter: Arc::new(TokenCounter::new()),
        }
    }

    /// Output root holding resume files, errors, and samples.
    pub fn out_root(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Settings for a single-collection run named `corpus`.
    pub fn settings(&self, batch_size_docs: usize) -> Settings {
        Settings {
            out_root: self.out_root().display().to_string(),
            collection: Some("corpus".to_string()),
            collection_strategy: CollectionStrategyKind::Single,
            batch_size_docs,
            ..Settings::default()
        }
    }

    /// Settings for a per-partition run prefixed `corpus`.
    pub fn per_partition_settings(&self, batch_size_docs: usize) -> Settings {
        Settings {
            collection_strategy: CollectionStrategyKind::PerPartition,
            ..self.settings(batch_size_docs)
        }
    }

    /// Write a `Table` CSV with `rows` generated rows.
    pub fn write_table_csv(&self, name: &str, rows: usize) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut body = String::from("table_name,description,row_count\n");
        for i in 1..=rows {
            body.push_str(&format!(
                "TAB{i:05},stores data about topic{i} records,{}\n",
                i * 10
            ));
        }
        write_file(&path, &body);
        path
    }

    /// Write a `Field` CSV with `rows` generated rows.
    pub fn write_field_csv(&self, name: &str, rows: usize) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut body = String::from("field_name,table_name,description\n");
        for i in 1..=rows {
            body.push_str(&format!(
                "FLD{i:05},TAB{:05},column holding value{i}\n",
                (i % 7) + 1
            ));
        }
        write_file(&path, &body);
        path
    }

    /// Register a partition whose models point at the given CSVs.
    pub fn register_partition(&self, files: &[(&str, &Path)]) -> PartitionEntry {
        let mut models = BTreeMap::new();
        for (model, path) in files {
            models.insert(
                model.to_string(),
                NewPartitionModel {
                    schema_version: 1,
                    source_path: path.display().to_string(),
                    digest_path: format!("{}.sha1", path.display()),
                },
            );
        }
        let name = self
            .manifest_store
            .append_partition(models, vec![])
            .expect("append partition");
        self.manifest_store
            .read()
            .expect("manifest")
            .partition(&name)
            .expect("new partition")
            .clone()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn write_file(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, body).expect("write csv");
}
