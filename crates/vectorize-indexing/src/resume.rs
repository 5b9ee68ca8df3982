//! Per-partition resume checkpoints.
//!
//! One JSON file per (partition, collection) maps model names to their
//! stream position. A record is written only after a successful flush,
//! always staged-then-renamed, so the file never reflects an in-flight
//! batch and a crash replays at most one batch on resume.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::IndexingError;

/// Suffix of resume files inside a partition directory.
pub const RESUME_FILE_SUFFIX: &str = "_resume_state.json";

/// Fingerprint of a prepared source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSignature {
    /// Modification time, milliseconds since the epoch
    pub mtime_ms: i64,
    /// File size in bytes
    pub size: u64,
}

impl SourceSignature {
    /// Fingerprint `path`, or `None` when it cannot be stat'ed.
    pub fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        let mtime = meta.modified().ok()?;
        let mtime_ms = mtime
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis() as i64)?;
        Some(Self {
            mtime_ms,
            size: meta.len(),
        })
    }
}

/// Resume record for one model within a partition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResumeState {
    /// All rows flushed and the final state persisted
    #[serde(default)]
    pub complete: bool,

    /// At least one flush succeeded for this model
    #[serde(default)]
    pub started: bool,

    /// Documents upserted by this pipeline across runs
    #[serde(default)]
    pub documents_indexed: u64,

    /// Documents believed present in the collection for this model
    #[serde(default)]
    pub collection_count: u64,

    /// When the record was last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,

    /// Fingerprint of the source at last write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_signature: Option<SourceSignature>,

    /// First unread byte after the last fully flushed row
    #[serde(default)]
    pub file_offset: u64,

    /// 1-based index of the last fully flushed data row
    #[serde(default)]
    pub row_index: u64,

    /// Header row captured when the file was first opened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fieldnames: Option<Vec<String>>,
}

/// Full resume document: model name to record.
pub type ResumeMap = BTreeMap<String, ModelResumeState>;

/// Reads and writes one partition-collection resume file.
pub struct ResumeStore {
    path: PathBuf,
}

impl ResumeStore {
    /// Store for `<out_root>/<partition>/<collection>_resume_state.json`.
    pub fn new(out_root: &Path, partition: &str, collection: &str) -> Self {
        Self {
            path: out_root
                .join(partition)
                .join(format!("{collection}{RESUME_FILE_SUFFIX}")),
        }
    }

    /// Resume file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the resume map.
    ///
    /// An absent file is an empty map; a malformed file is treated as
    /// empty with a warning so a corrupted checkpoint degrades to a
    /// full re-index instead of an error.
    pub fn load(&self) -> ResumeMap {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return ResumeMap::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed resume state; starting fresh");
                ResumeMap::new()
            }
        }
    }

    /// Persist the resume map atomically.
    pub fn save(&self, map: &ResumeMap) -> Result<(), IndexingError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut staged = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut staged, map)?;
        staged.write_all(b"\n")?;
        staged
            .persist(&self.path)
            .map_err(|e| IndexingError::Persist(e.to_string()))?;
        debug!(path = %self.path.display(), models = map.len(), "Persisted resume state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_absent_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path(), "partition_00001", "corpus");
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path(), "partition_00001", "corpus");

        let mut map = ResumeMap::new();
        map.insert(
            "Table".to_string(),
            ModelResumeState {
                started: true,
                documents_indexed: 500,
                collection_count: 500,
                file_offset: 40_960,
                row_index: 500,
                fieldnames: Some(vec!["table_name".to_string()]),
                indexed_at: Some(Utc::now()),
                ..ModelResumeState::default()
            },
        );
        store.save(&map).unwrap();

        let loaded = store.load();
        let entry = &loaded["Table"];
        assert!(entry.started);
        assert!(!entry.complete);
        assert_eq!(entry.row_index, 500);
        assert_eq!(entry.file_offset, 40_960);
        assert_eq!(entry.fieldnames.as_deref().unwrap(), ["table_name"]);
    }

    #[test]
    fn test_malformed_file_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let store = ResumeStore::new(dir.path(), "partition_00001", "corpus");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_source_signature_detects_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let first = SourceSignature::of(&path).unwrap();
        assert_eq!(first.size, 8);

        std::fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();
        let second = SourceSignature::of(&path).unwrap();
        assert_ne!(first, second);
        assert!(SourceSignature::of(&dir.path().join("missing.csv")).is_none());
    }
}
