//! Model specs and the process-wide model registry.
//!
//! A `ModelSpec` describes how one tabular export is indexed: which
//! fields carry embeddable text, which are elevated to metadata, and
//! which form the document identity. The registry is loaded once from a
//! JSON description file and passed explicitly to the indexer; it is
//! read-only after load.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ModelError;
use crate::schema::Schema;

/// How oversized document text is reduced to fit a token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Keep the prefix, drop the tail
    End,
    /// Keep the suffix, drop the head
    Start,
    /// Keep both ends, drop the middle
    MiddleOut,
    /// Keep whole sentences from both ends
    Sentences,
    /// Pick a strategy from the model's field hints
    Auto,
}

impl TruncationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruncationStrategy::End => "end",
            TruncationStrategy::Start => "start",
            TruncationStrategy::MiddleOut => "middle_out",
            TruncationStrategy::Sentences => "sentences",
            TruncationStrategy::Auto => "auto",
        }
    }
}

impl fmt::Display for TruncationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TruncationStrategy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "end" => Ok(TruncationStrategy::End),
            "start" => Ok(TruncationStrategy::Start),
            "middle_out" => Ok(TruncationStrategy::MiddleOut),
            "sentences" => Ok(TruncationStrategy::Sentences),
            "auto" => Ok(TruncationStrategy::Auto),
            other => Err(ModelError::Config(format!(
                "unknown truncation strategy '{other}'"
            ))),
        }
    }
}

/// Describes how one model's rows become indexable documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Unique model name (registry key, repeated here for convenience)
    pub name: String,

    /// Row schema
    pub schema: Schema,

    /// Fields whose concatenation becomes the embeddable text (order matters)
    pub semantic_fields: Vec<String>,

    /// Fields elevated into document metadata
    #[serde(default)]
    pub keyword_fields: Vec<String>,

    /// Fields whose values form the document id input
    pub key_fields: Vec<String>,

    /// Per-model override of the default truncation strategy
    #[serde(default)]
    pub truncation_strategy: Option<TruncationStrategy>,

    /// Source column renames: model field name to CSV column name.
    /// Fields not listed read from the column with their own name.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

impl ModelSpec {
    /// Stable structural signature, see [`Schema::signature_hash`].
    pub fn schema_signature(&self) -> String {
        self.schema.signature_hash(
            &self.semantic_fields,
            &self.keyword_fields,
            &self.key_fields,
        )
    }

    /// Check that declared field subsets actually exist in the schema.
    fn check_field_refs(&self) -> Result<(), ModelError> {
        for (label, names) in [
            ("semantic_fields", &self.semantic_fields),
            ("keyword_fields", &self.keyword_fields),
            ("key_fields", &self.key_fields),
        ] {
            for name in names {
                if self.schema.field(name).is_none() {
                    return Err(ModelError::Schema {
                        model: self.name.clone(),
                        message: format!("{label} references unknown field '{name}'"),
                    });
                }
            }
        }
        if self.key_fields.is_empty() {
            return Err(ModelError::Schema {
                model: self.name.clone(),
                message: "key_fields must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Read-only mapping of model name to spec, loaded at start-up.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelSpec>,
}

impl ModelRegistry {
    /// Build a registry from already-constructed specs (used by tests).
    pub fn from_specs(specs: Vec<ModelSpec>) -> Result<Self, ModelError> {
        let mut models = BTreeMap::new();
        for spec in specs {
            spec.check_field_refs()?;
            if models.insert(spec.name.clone(), spec).is_some() {
                return Err(ModelError::Config(
                    "duplicate model name in registry".to_string(),
                ));
            }
        }
        if models.is_empty() {
            return Err(ModelError::Config(
                "model registry is empty; no models available".to_string(),
            ));
        }
        Ok(Self { models })
    }

    /// Load a registry from a JSON description file.
    ///
    /// The file maps model names to spec bodies; the `name` field inside
    /// each body is optional and overwritten by the map key.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path)?;
        let mut entries: BTreeMap<String, ModelSpec> = serde_json::from_str(&raw)?;
        for (name, spec) in entries.iter_mut() {
            spec.name = name.clone();
        }
        debug!(path = %path.display(), models = entries.len(), "Loaded model registry");
        Self::from_specs(entries.into_values().collect())
    }

    /// Look up one model spec.
    pub fn get(&self, name: &str) -> Result<&ModelSpec, ModelError> {
        self.models
            .get(name)
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    /// Model names in stable declaration order.
    pub fn model_names(&self) -> Vec<&str> {
        self.models.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the registry has no models (never true after load).
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Iterate over (name, spec) pairs in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelSpec)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }
}
