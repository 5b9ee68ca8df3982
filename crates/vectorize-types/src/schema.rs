//! Interpreted row schemas.
//!
//! A `Schema` is the runtime description of one model's tabular shape:
//! an ordered field list with scalar kinds and a required flag. Rows
//! arrive as string maps (CSV cells) and validate into typed `Record`s.
//! The schema also carries a stable signature hash so manifest entries
//! can detect structural drift across export runs.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Scalar kind of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
}

impl FieldKind {
    /// Short name used in signature hashing and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
        }
    }
}

/// One field in a model schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name as it appears in prepared exports
    pub name: String,

    /// Scalar kind the cell must parse into
    #[serde(default = "default_field_kind")]
    pub kind: FieldKind,

    /// Whether a non-empty value must be present
    #[serde(default)]
    pub required: bool,
}

fn default_field_kind() -> FieldKind {
    FieldKind::String
}

/// A typed cell value after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    /// True for `Null`, empty strings, and whitespace-only strings.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Str(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// String rendering used when composing document text and ids.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Str(s) => s.clone(),
        }
    }
}

/// A validated row: field name to typed value, iteration in key order.
pub type Record = BTreeMap<String, FieldValue>;

/// Serialize a record as canonical JSON (sorted keys, compact separators).
///
/// Used both for the `has_sem=false` document text fallback and for
/// fixture comparisons in tests.
pub fn canonical_json(record: &Record) -> Result<String, ModelError> {
    Ok(serde_json::to_string(record)?)
}

/// Runtime schema for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// Ordered field definitions
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Ordered field names.
    pub fn field_order(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Look up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a raw string row into a typed record.
    ///
    /// Cells that are absent, empty, or whitespace-only become `Null`;
    /// a required field resolving to `Null` fails validation, as does a
    /// cell that does not parse into its declared kind. Columns not in
    /// the schema are ignored.
    pub fn validate(
        &self,
        model: &str,
        row: &BTreeMap<String, String>,
    ) -> Result<Record, ModelError> {
        let mut record = Record::new();
        for field in &self.fields {
            let raw = row.get(&field.name).map(|s| s.trim()).unwrap_or("");
            if raw.is_empty() {
                if field.required {
                    return Err(ModelError::Validation {
                        model: model.to_string(),
                        field: field.name.clone(),
                        message: "required field is missing or empty".to_string(),
                    });
                }
                record.insert(field.name.clone(), FieldValue::Null);
                continue;
            }
            let value = match field.kind {
                FieldKind::String => FieldValue::Str(raw.to_string()),
                FieldKind::Integer => {
                    FieldValue::Int(raw.parse::<i64>().map_err(|e| ModelError::Validation {
                        model: model.to_string(),
                        field: field.name.clone(),
                        message: format!("expected integer, got '{raw}': {e}"),
                    })?)
                }
                FieldKind::Float => {
                    FieldValue::Float(raw.parse::<f64>().map_err(|e| ModelError::Validation {
                        model: model.to_string(),
                        field: field.name.clone(),
                        message: format!("expected float, got '{raw}': {e}"),
                    })?)
                }
                FieldKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => FieldValue::Bool(true),
                    "false" | "0" | "no" => FieldValue::Bool(false),
                    other => {
                        return Err(ModelError::Validation {
                            model: model.to_string(),
                            field: field.name.clone(),
                            message: format!("expected boolean, got '{other}'"),
                        })
                    }
                },
            };
            record.insert(field.name.clone(), value);
        }
        Ok(record)
    }

    /// Stable signature over field names, kinds, and flags.
    ///
    /// Two processes loading the same schema description always compute
    /// the same signature; any structural change (rename, retype, flag
    /// flip, reorder) produces a different one.
    pub fn signature_hash(
        &self,
        semantic_fields: &[String],
        keyword_fields: &[String],
        key_fields: &[String],
    ) -> String {
        let mut hasher = DefaultHasher::new();
        for field in &self.fields {
            field.name.hash(&mut hasher);
            field.kind.as_str().hash(&mut hasher);
            field.required.hash(&mut hasher);
        }
        "sem".hash(&mut hasher);
        semantic_fields.hash(&mut hasher);
        "kw".hash(&mut hasher);
        keyword_fields.hash(&mut hasher);
        "key".hash(&mut hasher);
        key_fields.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}
