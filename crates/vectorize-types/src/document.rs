//! The unit of ingestion: an id, embeddable text, and flat metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar metadata value accepted by the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Int(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Flat metadata map attached to every document.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Well-known metadata keys written by the document builder.
pub mod meta_keys {
    pub const MODEL_NAME: &str = "model_name";
    pub const PARTITION_NAME: &str = "partition_name";
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const SOURCE_PATH: &str = "source_path";
    pub const HAS_SEM: &str = "has_sem";
    pub const TRUNCATED: &str = "truncated";
    pub const ORIGINAL_TOKENS: &str = "original_tokens";
    pub const TRUNCATION_STRATEGY: &str = "truncation_strategy";
}

/// One indexable document produced from a validated row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Deterministic id: `"{model}:{hex16}"`
    pub id: String,

    /// Embeddable text, possibly truncated
    pub text: String,

    /// Flat scalar metadata
    pub metadata: Metadata,

    /// Token count of `text` under the frozen encoding
    pub token_count: usize,
}

impl Document {
    /// Model name recorded in metadata, if present.
    pub fn model_name(&self) -> Option<&str> {
        match self.metadata.get(meta_keys::MODEL_NAME) {
            Some(MetadataValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether any semantic field carried content.
    pub fn has_sem(&self) -> bool {
        matches!(
            self.metadata.get(meta_keys::HAS_SEM),
            Some(MetadataValue::Bool(true))
        )
    }
}
