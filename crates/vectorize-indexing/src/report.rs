//! On-disk error reports for failed flushes.
//!
//! Every irrecoverable batch failure leaves an immutable YAML file under
//! `<out_root>/<partition>/errors/` carrying the whole batch, the resume
//! state at that point, and the error chain. Reports are never deleted
//! by the pipeline; status classification compares their row indexes
//! with the live resume state.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use vectorize_types::Metadata;

use crate::batch::Flush;
use crate::error::IndexingError;
use crate::resume::ModelResumeState;

/// Longest document excerpt stored in a report.
const REPORT_DOCUMENT_CHARS: usize = 1_000;

/// Immutable description of one failed flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub model_name: String,
    pub collection_name: String,
    /// Flush reason, or `validation` for row-validation failures
    pub reason: String,
    pub source_csv: String,
    pub batch_size: usize,
    pub document_ids: Vec<String>,
    /// Document texts, truncated for the report
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub row_numbers: Vec<u64>,
    pub token_counts: Vec<usize>,
    pub token_total: usize,
    /// Resume state at the moment of failure
    pub resume_state: ModelResumeState,
    pub error_type: String,
    pub error_message: String,
    /// Source chain of the error, outermost first
    pub error_chain: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

fn chain_of(err: &IndexingError) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

impl ErrorReport {
    /// Describe a failed batch flush.
    pub fn for_flush(
        model: &str,
        collection: &str,
        source_csv: &Path,
        flush: &Flush,
        resume_state: &ModelResumeState,
        err: &IndexingError,
    ) -> Self {
        Self {
            model_name: model.to_string(),
            collection_name: collection.to_string(),
            reason: flush.reason.to_string(),
            source_csv: source_csv.display().to_string(),
            batch_size: flush.len(),
            document_ids: flush.documents.iter().map(|d| d.document.id.clone()).collect(),
            documents: flush
                .documents
                .iter()
                .map(|d| truncate_chars(&d.document.text, REPORT_DOCUMENT_CHARS))
                .collect(),
            metadatas: flush
                .documents
                .iter()
                .map(|d| d.document.metadata.clone())
                .collect(),
            row_numbers: flush.documents.iter().map(|d| d.row_index).collect(),
            token_counts: flush
                .documents
                .iter()
                .map(|d| d.document.token_count)
                .collect(),
            token_total: flush.token_total,
            resume_state: resume_state.clone(),
            error_type: err.class().as_str().to_string(),
            error_message: err.to_string(),
            error_chain: chain_of(err),
            timestamp: Utc::now(),
        }
    }

    /// Describe a row-validation failure (no batch involved).
    pub fn for_validation(
        model: &str,
        collection: &str,
        source_csv: &Path,
        row_index: u64,
        resume_state: &ModelResumeState,
        err: &IndexingError,
    ) -> Self {
        Self {
            model_name: model.to_string(),
            collection_name: collection.to_string(),
            reason: "validation".to_string(),
            source_csv: source_csv.display().to_string(),
            batch_size: 0,
            document_ids: vec![],
            documents: vec![],
            metadatas: vec![],
            row_numbers: vec![row_index],
            token_counts: vec![],
            token_total: 0,
            resume_state: resume_state.clone(),
            error_type: err.class().as_str().to_string(),
            error_message: err.to_string(),
            error_chain: chain_of(err),
            timestamp: Utc::now(),
        }
    }

    /// Highest row index the report refers to.
    pub fn max_row_index(&self) -> u64 {
        self.row_numbers
            .iter()
            .copied()
            .max()
            .unwrap_or(self.resume_state.row_index)
    }

    /// Write the report under `errors_dir`, returning its path.
    pub fn write(&self, errors_dir: &Path) -> Result<PathBuf, IndexingError> {
        std::fs::create_dir_all(errors_dir)?;
        let filename = format!(
            "{}_{}.yaml",
            self.model_name,
            self.timestamp.format("%Y%m%dT%H%M%S%3fZ")
        );
        let path = errors_dir.join(filename);
        let body = serde_yaml::to_string(self)?;
        std::fs::write(&path, body)?;
        error!(report = %path.display(), model = %self.model_name, "Wrote error report");
        Ok(path)
    }
}

/// Load every report for `model` under `errors_dir`.
///
/// Unreadable or malformed report files are skipped with a warning.
pub fn read_error_reports(errors_dir: &Path, model: &str) -> Vec<ErrorReport> {
    let prefix = format!("{model}_");
    let Ok(entries) = std::fs::read_dir(errors_dir) else {
        return Vec::new();
    };
    let mut reports = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(&prefix) || !name.ends_with(".yaml") {
            continue;
        }
        let raw = match std::fs::read_to_string(entry.path()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Unreadable error report");
                continue;
            }
        };
        match serde_yaml::from_str::<ErrorReport>(&raw) {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Malformed error report");
            }
        }
    }
    reports
}
