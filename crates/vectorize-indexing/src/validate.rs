//! Pre-flight validation of prepared partition sources.
//!
//! Streams every model file once, checking header presence and per-row
//! schema conformance, without touching the vector store. Used by the
//! `validate` CLI verb so operators catch bad exports before an
//! expensive indexing run.

use std::path::Path;

use tracing::{error, info};

use vectorize_manifest::PartitionEntry;
use vectorize_types::ModelRegistry;

use crate::error::IndexingError;
use crate::indexer::remap_row;

/// Validation result for one model file.
#[derive(Debug, Clone)]
pub struct SourceValidation {
    pub model: String,
    pub path: String,
    pub rows_checked: u64,
    /// First failure, if any: (row index, message)
    pub failure: Option<(u64, String)>,
}

impl SourceValidation {
    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }
}

/// Validate every model file of one partition.
///
/// A model whose prepared file is missing fails validation (unlike
/// indexing, which skips it with a warning). Dropped models are
/// ignored. Stops at the first failing row per model but continues
/// across models.
pub fn validate_partition_sources(
    registry: &ModelRegistry,
    entry: &PartitionEntry,
) -> Result<Vec<SourceValidation>, IndexingError> {
    let mut results = Vec::new();

    for (model_name, partition_model) in &entry.models {
        if partition_model.deleted {
            continue;
        }
        let spec = registry.get(model_name)?;
        let path = Path::new(&partition_model.source_path);

        if !path.exists() {
            error!(
                model = %model_name,
                path = %path.display(),
                "Validation failed: prepared file does not exist"
            );
            results.push(SourceValidation {
                model: model_name.clone(),
                path: partition_model.source_path.clone(),
                rows_checked: 0,
                failure: Some((0, "prepared file does not exist".to_string())),
            });
            continue;
        }

        info!(model = %model_name, path = %path.display(), "Validating source");
        let file = std::fs::File::open(path)?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        if headers.is_empty() {
            results.push(SourceValidation {
                model: model_name.clone(),
                path: partition_model.source_path.clone(),
                rows_checked: 0,
                failure: Some((0, "no header row".to_string())),
            });
            continue;
        }

        let mut rows_checked = 0u64;
        let mut failure = None;
        let mut record = csv::StringRecord::new();
        loop {
            match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {
                    rows_checked += 1;
                    let row = remap_row(&headers, &record, spec);
                    if let Err(e) = spec.schema.validate(model_name, &row) {
                        error!(
                            model = %model_name,
                            row = rows_checked,
                            error = %e,
                            "Validation failed"
                        );
                        failure = Some((rows_checked, e.to_string()));
                        break;
                    }
                }
                Err(e) => {
                    error!(model = %model_name, row = rows_checked + 1, error = %e, "CSV parse error");
                    failure = Some((rows_checked + 1, e.to_string()));
                    break;
                }
            }
        }

        results.push(SourceValidation {
            model: model_name.clone(),
            path: partition_model.source_path.clone(),
            rows_checked,
            failure,
        });
    }
    Ok(results)
}
