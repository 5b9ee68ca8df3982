//! Turns validated rows into indexable documents.
//!
//! The builder owns the per-model composition rules: deterministic id,
//! semantic text with canonical-JSON fallback, fixed metadata keys plus
//! keyword fields, and the token ceiling with its truncation margin.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::warn;

use vectorize_tokens::{auto_strategy, fit, TokenCounter};
use vectorize_types::{
    canonical_json, format_count, meta_keys, Document, Metadata, ModelSpec, Record,
    TruncationStrategy,
};

use crate::error::IndexingError;

/// Separator between key-field values in the id hash input.
const KEY_JOIN: char = '\u{241f}';

/// Fraction of the hard limit left as headroom when truncating.
const TRUNCATION_MARGIN: f64 = 0.95;

/// Context shared by every document of one partition-model stream.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub partition_name: String,
    pub schema_version: u32,
    pub source_path: String,
}

/// Builds documents for one model.
pub struct DocumentBuilder {
    spec: ModelSpec,
    counter: Arc<TokenCounter>,
    default_strategy: TruncationStrategy,
    api_token_limit: usize,
}

impl DocumentBuilder {
    pub fn new(
        spec: ModelSpec,
        counter: Arc<TokenCounter>,
        default_strategy: TruncationStrategy,
        api_token_limit: usize,
    ) -> Self {
        Self {
            spec,
            counter,
            default_strategy,
            api_token_limit,
        }
    }

    /// Deterministic document id: `"{model}:{hex16}"` over key fields.
    pub fn document_id(&self, record: &Record) -> String {
        let joined: String = self
            .spec
            .key_fields
            .iter()
            .map(|field| {
                record
                    .get(field)
                    .map(|v| v.render())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(&KEY_JOIN.to_string());
        let mut hasher = DefaultHasher::new();
        joined.hash(&mut hasher);
        format!("{}:{:016x}", self.spec.name, hasher.finish())
    }

    /// Strategy after the selection order: model override, caller
    /// default, then field hints for `auto`.
    fn resolve_strategy(&self) -> TruncationStrategy {
        let chosen = self
            .spec
            .truncation_strategy
            .unwrap_or(self.default_strategy);
        if chosen == TruncationStrategy::Auto {
            auto_strategy(&self.spec.semantic_fields)
        } else {
            chosen
        }
    }

    /// Build a document from a validated record.
    ///
    /// Returns `None` when the document cannot be brought under the hard
    /// token limit even after truncation; the row is skipped with a
    /// structured warning and the stream continues.
    pub fn build(
        &self,
        record: &Record,
        context: &BuildContext,
    ) -> Result<Option<Document>, IndexingError> {
        let id = self.document_id(record);

        let semantic_values: Vec<String> = self
            .spec
            .semantic_fields
            .iter()
            .filter_map(|field| record.get(field))
            .filter(|value| !value.is_empty())
            .map(|value| value.render())
            .collect();
        let has_sem = !semantic_values.is_empty();
        let mut text = if has_sem {
            semantic_values.join("\n")
        } else {
            canonical_json(record)?
        };

        let mut metadata = Metadata::new();
        metadata.insert(
            meta_keys::MODEL_NAME.to_string(),
            self.spec.name.clone().into(),
        );
        metadata.insert(
            meta_keys::PARTITION_NAME.to_string(),
            context.partition_name.clone().into(),
        );
        metadata.insert(
            meta_keys::SCHEMA_VERSION.to_string(),
            (context.schema_version as i64).into(),
        );
        metadata.insert(
            meta_keys::SOURCE_PATH.to_string(),
            context.source_path.clone().into(),
        );
        metadata.insert(meta_keys::HAS_SEM.to_string(), has_sem.into());
        for field in &self.spec.keyword_fields {
            if let Some(value) = record.get(field) {
                if !value.is_empty() {
                    metadata.insert(field.clone(), value.render().into());
                }
            }
        }

        let mut token_count = self.counter.count(&text);
        if token_count > self.api_token_limit {
            let strategy = self.resolve_strategy();
            let budget = (self.api_token_limit as f64 * TRUNCATION_MARGIN) as usize;
            let original_tokens = token_count;
            let truncation = fit(&self.counter, &text, budget, strategy);

            if truncation.tokens > self.api_token_limit {
                warn!(
                    doc_id = %id,
                    model = %self.spec.name,
                    original_tokens = original_tokens,
                    "Document still over the hard token limit after truncation; skipping"
                );
                return Ok(None);
            }

            warn!(
                doc_id = %id,
                model = %self.spec.name,
                original = %format_count(original_tokens),
                truncated = %format_count(truncation.tokens),
                strategy = %truncation.strategy,
                "Truncated oversized document"
            );
            text = truncation.text;
            token_count = truncation.tokens;
            metadata.insert(meta_keys::TRUNCATED.to_string(), true.into());
            metadata.insert(
                meta_keys::ORIGINAL_TOKENS.to_string(),
                (original_tokens as i64).into(),
            );
            metadata.insert(
                meta_keys::TRUNCATION_STRATEGY.to_string(),
                truncation.strategy.as_str().into(),
            );
        } else {
            metadata.insert(meta_keys::TRUNCATED.to_string(), false.into());
        }

        Ok(Some(Document {
            id,
            text,
            metadata,
            token_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vectorize_types::{FieldDef, FieldKind, FieldValue, MetadataValue, Schema};

    fn spec() -> ModelSpec {
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
            columns: std::collections::BTreeMap::new(),
        }
    }

    fn builder(limit: usize) -> DocumentBuilder {
        DocumentBuilder::new(
            spec(),
            Arc::new(TokenCounter::new()),
            TruncationStrategy::Auto,
            limit,
        )
    }

    fn context() -> BuildContext {
        BuildContext {
            partition_name: "partition_00001".to_string(),
            schema_version: 2,
            source_path: "partition_00001/Table.csv".to_string(),
        }
    }

    fn record(name: &str, description: Option<&str>) -> Record {
        let mut r = Record::new();
        r.insert(
            "table_name".to_string(),
            FieldValue::Str(name.to_string()),
        );
        r.insert(
            "description".to_string(),
            description
                .map(|d| FieldValue::Str(d.to_string()))
                .unwrap_or(FieldValue::Null),
        );
        r.insert("row_count".to_string(), FieldValue::Int(10));
        r
    }

    #[test]
    fn test_id_is_pure_function_of_keys() {
        let b = builder(8192);
        let a = b.document_id(&record("MARA", Some("materials")));
        let same_keys = b.document_id(&record("MARA", Some("different text")));
        let other_keys = b.document_id(&record("MARC", Some("materials")));
        assert_eq!(a, same_keys);
        assert_ne!(a, other_keys);
        assert!(a.starts_with("Table:"));
        assert_eq!(a.len(), "Table:".len() + 16);
    }

    #[test]
    fn test_semantic_text_joins_fields() {
        let b = builder(8192);
        let doc = b
            .build(&record("MARA", Some("material master")), &context())
            .unwrap()
            .unwrap();
        assert_eq!(doc.text, "MARA\nmaterial master");
        assert!(doc.has_sem());
        assert_eq!(
            doc.metadata.get("table_name"),
            Some(&MetadataValue::Str("MARA".to_string()))
        );
        assert_eq!(
            doc.metadata.get(meta_keys::SCHEMA_VERSION),
            Some(&MetadataValue::Int(2))
        );
        assert_eq!(
            doc.metadata.get(meta_keys::TRUNCATED),
            Some(&MetadataValue::Bool(false))
        );
    }

    #[test]
    fn test_no_semantic_content_falls_back_to_canonical_json() {
        let mut spec = spec();
        spec.semantic_fields = vec!["description".to_string()];
        let b = DocumentBuilder::new(
            spec,
            Arc::new(TokenCounter::new()),
            TruncationStrategy::Auto,
            8192,
        );
        let rec = record("MARA", None);
        let doc = b.build(&rec, &context()).unwrap().unwrap();
        assert!(!doc.has_sem());
        assert_eq!(doc.text, canonical_json(&rec).unwrap());
    }

    #[test]
    fn test_oversized_document_is_truncated_with_margin() {
        let b = builder(50);
        let long = "token heavy description ".repeat(100);
        let doc = b
            .build(&record("MARA", Some(&long)), &context())
            .unwrap()
            .unwrap();
        assert!(doc.token_count <= 50);
        assert_eq!(
            doc.metadata.get(meta_keys::TRUNCATED),
            Some(&MetadataValue::Bool(true))
        );
        assert!(doc.metadata.contains_key(meta_keys::ORIGINAL_TOKENS));
        assert!(doc.metadata.contains_key(meta_keys::TRUNCATION_STRATEGY));
    }

    #[test]
    fn test_token_count_matches_text() {
        let counter = TokenCounter::new();
        let b = builder(8192);
        let doc = b
            .build(&record("MARA", Some("short text")), &context())
            .unwrap()
            .unwrap();
        assert_eq!(doc.token_count, counter.count(&doc.text));
    }
}
