//! Model-centric drop planning.
//!
//! A drop plan selects (model, partition, schema version) slices from
//! the manifest; applying it is the indexer's job since it touches the
//! vector store. Plans are plain JSON under `configs/drop/`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::ManifestError;
use crate::types::Manifest;

/// Per-model slice of a drop plan.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DropModelPlan {
    /// Partitions whose rows are dropped
    pub partitions: Vec<String>,

    /// Schema versions present in those partitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_versions: Vec<u32>,

    /// Operator-supplied reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A generated drop plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropPlan {
    /// When the plan was generated
    pub generated_at: DateTime<Utc>,

    /// Manifest the plan was derived from
    pub source_manifest: String,

    /// Creation-date upper bound used during generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,

    /// Creation-date lower bound used during generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,

    /// Model name to planned slice
    pub models: BTreeMap<String, DropModelPlan>,
}

impl DropPlan {
    /// True when no model matched the selection.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Load a plan from disk.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the plan atomically.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut staged = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut staged, self)?;
        staged.write_all(b"\n")?;
        staged
            .persist(path)
            .map_err(|e| ManifestError::Persist(e.to_string()))?;
        Ok(())
    }
}

/// Parse a date bound: `YYYY-MM-DD` or a full ISO timestamp.
fn parse_bound(value: Option<&str>) -> Option<NaiveDateTime> {
    let value = value?;
    if let Ok(dt) = value.parse::<NaiveDateTime>() {
        return Some(dt);
    }
    match value.parse::<NaiveDate>() {
        Ok(date) => date.and_hms_opt(0, 0, 0),
        Err(_) => {
            warn!(value = %value, "Could not parse date bound; ignoring");
            None
        }
    }
}

/// Build a drop plan for `models` from the current manifest snapshot.
///
/// Partitions outside the `[after, before)` creation window and pairs
/// already marked deleted are excluded. Models with no matching
/// partition are left out of the plan entirely.
pub fn generate_drop_plan(
    manifest: &Manifest,
    manifest_path: &Path,
    models: &[String],
    before: Option<&str>,
    after: Option<&str>,
    reason: Option<&str>,
) -> DropPlan {
    let before_dt = parse_bound(before);
    let after_dt = parse_bound(after);

    let mut planned = BTreeMap::new();
    for model in models {
        let mut partitions = BTreeSet::new();
        let mut versions = BTreeSet::new();

        for entry in &manifest.partitions {
            let created = entry.created_at.naive_utc();
            if before_dt.is_some_and(|b| created >= b) {
                continue;
            }
            if after_dt.is_some_and(|a| created < a) {
                continue;
            }
            let Some(model_info) = entry.models.get(model) else {
                continue;
            };
            if model_info.deleted {
                continue;
            }
            partitions.insert(entry.name.clone());
            versions.insert(model_info.schema_version);
        }

        if partitions.is_empty() {
            continue;
        }
        planned.insert(
            model.clone(),
            DropModelPlan {
                partitions: partitions.into_iter().collect(),
                schema_versions: versions.into_iter().collect(),
                reason: reason.map(|r| r.to_string()),
            },
        );
    }

    DropPlan {
        generated_at: Utc::now(),
        source_manifest: manifest_path.display().to_string(),
        before: before.map(|s| s.to_string()),
        after: after.map(|s| s.to_string()),
        models: planned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PartitionEntry, PartitionModel};
    use chrono::TimeZone;

    fn entry(name: &str, model: &str, version: u32, day: u32, deleted: bool) -> PartitionEntry {
        let mut models = BTreeMap::new();
        models.insert(
            model.to_string(),
            PartitionModel {
                schema_version: version,
                source_path: format!("{name}/{model}.csv"),
                digest_path: format!("{name}/{model}.csv.sha1"),
                deleted,
                deleted_at: None,
                drop_reason: None,
            },
        );
        PartitionEntry {
            name: name.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
            models,
            replaces: vec![],
            stale: false,
        }
    }

    fn manifest() -> Manifest {
        Manifest {
            partitions: vec![
                entry("partition_00037", "Table", 2, 1, false),
                entry("partition_00038", "Table", 3, 10, false),
                entry("partition_00039", "Field", 1, 20, false),
                entry("partition_00040", "Table", 3, 25, true),
            ],
            ..Manifest::default()
        }
    }

    #[test]
    fn test_plan_selects_live_pairs() {
        let manifest = manifest();
        let plan = generate_drop_plan(
            &manifest,
            Path::new("root/manifest.json"),
            &["Table".to_string()],
            None,
            None,
            Some("stale export"),
        );
        let table = &plan.models["Table"];
        assert_eq!(table.partitions, vec!["partition_00037", "partition_00038"]);
        assert_eq!(table.schema_versions, vec![2, 3]);
        assert_eq!(table.reason.as_deref(), Some("stale export"));
    }

    #[test]
    fn test_plan_respects_date_window() {
        let manifest = manifest();
        let plan = generate_drop_plan(
            &manifest,
            Path::new("root/manifest.json"),
            &["Table".to_string()],
            Some("2026-03-05"),
            None,
            None,
        );
        assert_eq!(plan.models["Table"].partitions, vec!["partition_00037"]);
        assert_eq!(plan.before.as_deref(), Some("2026-03-05"));
    }

    #[test]
    fn test_plan_skips_unmatched_models() {
        let manifest = manifest();
        let plan = generate_drop_plan(
            &manifest,
            Path::new("root/manifest.json"),
            &["Domain".to_string()],
            None,
            None,
            None,
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_round_trip() {
        let manifest = manifest();
        let plan = generate_drop_plan(
            &manifest,
            Path::new("root/manifest.json"),
            &["Table".to_string(), "Field".to_string()],
            None,
            None,
            None,
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs/drop/plan.json");
        plan.save(&path).unwrap();
        let loaded = DropPlan::load(&path).unwrap();
        assert_eq!(loaded.models.len(), 2);
        assert_eq!(
            loaded.models["Field"].partitions,
            vec!["partition_00039".to_string()]
        );
    }
}
