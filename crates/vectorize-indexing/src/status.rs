//! Status classification for partition models.
//!
//! A model counts as errored only while the indexer has not progressed
//! past the last recorded failure: once resume's `row_index` surpasses
//! every error report's rows, the state reverts to started/complete
//! without touching the report files.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::report::read_error_reports;
use crate::resume::{ModelResumeState, ResumeStore};

/// Lifecycle state of one partition model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    NotStarted,
    Started,
    Complete,
    Errored,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::NotStarted => "not_started",
            ModelStatus::Started => "started",
            ModelStatus::Complete => "complete",
            ModelStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one model from its resume record and error history.
///
/// `max_error_row` is the highest row index across the model's error
/// reports, if any exist.
pub fn classify_model(
    resume: Option<&ModelResumeState>,
    max_error_row: Option<u64>,
) -> ModelStatus {
    let base = match resume {
        Some(state) if state.complete => ModelStatus::Complete,
        Some(state) if state.started => ModelStatus::Started,
        _ => ModelStatus::NotStarted,
    };
    match max_error_row {
        Some(error_row) => {
            let current_row = resume.map(|s| s.row_index).unwrap_or(0);
            if error_row >= current_row {
                ModelStatus::Errored
            } else {
                base
            }
        }
        None => base,
    }
}

/// Per-model status of one partition-collection pair.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionStatus {
    pub partition: String,
    pub collection: String,
    pub models: BTreeMap<String, ModelStatus>,
}

/// Compute statuses by reading the resume file and errors directory.
pub fn partition_status(
    out_root: &Path,
    partition: &str,
    collection: &str,
    models: &[String],
) -> PartitionStatus {
    let resume_map = ResumeStore::new(out_root, partition, collection).load();
    let errors_dir = out_root.join(partition).join("errors");

    let mut statuses = BTreeMap::new();
    for model in models {
        let max_error_row = read_error_reports(&errors_dir, model)
            .iter()
            .map(|r| r.max_row_index())
            .max();
        statuses.insert(
            model.clone(),
            classify_model(resume_map.get(model), max_error_row),
        );
    }
    PartitionStatus {
        partition: partition.to_string(),
        collection: collection.to_string(),
        models: statuses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(started: bool, complete: bool, row_index: u64) -> ModelResumeState {
        ModelResumeState {
            started,
            complete,
            row_index,
            ..ModelResumeState::default()
        }
    }

    #[test]
    fn test_basic_states() {
        assert_eq!(classify_model(None, None), ModelStatus::NotStarted);
        assert_eq!(
            classify_model(Some(&state(false, false, 0)), None),
            ModelStatus::NotStarted
        );
        assert_eq!(
            classify_model(Some(&state(true, false, 10)), None),
            ModelStatus::Started
        );
        assert_eq!(
            classify_model(Some(&state(true, true, 10)), None),
            ModelStatus::Complete
        );
    }

    #[test]
    fn test_errored_when_failure_not_passed() {
        assert_eq!(
            classify_model(Some(&state(true, false, 500)), Some(500)),
            ModelStatus::Errored
        );
        assert_eq!(
            classify_model(Some(&state(true, false, 400)), Some(500)),
            ModelStatus::Errored
        );
        assert_eq!(classify_model(None, Some(3)), ModelStatus::Errored);
    }

    #[test]
    fn test_recovers_once_progress_passes_failure() {
        assert_eq!(
            classify_model(Some(&state(true, false, 700)), Some(500)),
            ModelStatus::Started
        );
        assert_eq!(
            classify_model(Some(&state(true, true, 1_000)), Some(500)),
            ModelStatus::Complete
        );
    }
}
