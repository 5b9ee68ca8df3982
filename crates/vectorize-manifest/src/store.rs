//! Serialised read-modify-write access to the manifest file.
//!
//! All mutations go through a single in-process mutex and are staged to
//! a temp file in the manifest's directory, then renamed into place, so
//! a crash never leaves a half-written manifest. Readers take whole-file
//! snapshots and need no lock.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::ManifestError;
use crate::types::{
    parse_partition_index, DropAudit, Manifest, PartitionEntry, PartitionModel, MANIFEST_VERSION,
};

/// Input for registering one model inside a new partition.
#[derive(Debug, Clone)]
pub struct NewPartitionModel {
    pub schema_version: u32,
    pub source_path: String,
    pub digest_path: String,
}

/// Handle to the manifest file with serialised writers.
pub struct ManifestStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ManifestStore {
    /// Create a store for the manifest at `path` (the file may not exist yet).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Manifest file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot the manifest; a missing file reads as an empty registry.
    pub fn read(&self) -> Result<Manifest, ManifestError> {
        if !self.path.exists() {
            return Ok(Manifest::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let manifest: Manifest = serde_json::from_str(&raw)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::Invalid(format!(
                "unsupported manifest version {}; expected {MANIFEST_VERSION}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    /// Register a new partition, allocating the next monotonic name.
    ///
    /// `replaces` must name partitions that already exist and were
    /// allocated earlier than the new one.
    pub fn append_partition(
        &self,
        models: BTreeMap<String, NewPartitionModel>,
        replaces: Vec<String>,
    ) -> Result<String, ManifestError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut manifest = self.read()?;

        let name = manifest.next_partition_name();
        let new_index = parse_partition_index(&name).unwrap_or(u32::MAX);
        for replaced in &replaces {
            let Some(idx) = parse_partition_index(replaced) else {
                return Err(ManifestError::Invalid(format!(
                    "replaces entry '{replaced}' is not a partition name"
                )));
            };
            if manifest.partition(replaced).is_none() {
                return Err(ManifestError::UnknownPartition(replaced.clone()));
            }
            if idx >= new_index {
                return Err(ManifestError::Invalid(format!(
                    "partition {name} cannot replace later partition {replaced}"
                )));
            }
        }

        let entry = PartitionEntry {
            name: name.clone(),
            created_at: Utc::now(),
            models: models
                .into_iter()
                .map(|(model, m)| {
                    (
                        model,
                        PartitionModel {
                            schema_version: m.schema_version,
                            source_path: m.source_path,
                            digest_path: m.digest_path,
                            deleted: false,
                            deleted_at: None,
                            drop_reason: None,
                        },
                    )
                })
                .collect(),
            replaces,
            stale: false,
        };
        info!(partition = %entry.name, models = entry.models.len(), "Registering partition");
        manifest.partitions.push(entry);
        self.write_snapshot(&manifest)?;
        Ok(name)
    }

    /// Flag partitions as stale (superseded by replacements).
    ///
    /// Returns how many entries changed; unknown names are logged and
    /// skipped.
    pub fn mark_stale(&self, partitions: &[String]) -> Result<usize, ManifestError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut manifest = self.read()?;
        let mut changed = 0;
        for name in partitions {
            match manifest.partitions.iter_mut().find(|p| &p.name == name) {
                Some(entry) => {
                    if !entry.stale {
                        entry.stale = true;
                        changed += 1;
                    }
                }
                None => warn!(partition = %name, "Cannot mark unknown partition stale"),
            }
        }
        if changed > 0 {
            self.write_snapshot(&manifest)?;
            info!(count = changed, "Marked partitions stale");
        }
        Ok(changed)
    }

    /// Flag model-partition pairs as deleted and append a drop audit entry.
    ///
    /// `affected` maps model names to the partitions their rows were
    /// dropped from. Pairs already deleted are left untouched but still
    /// recorded in the audit entry.
    pub fn mark_deleted(
        &self,
        affected: &BTreeMap<String, Vec<String>>,
        reason: Option<&str>,
        performed_by: &str,
        config: &str,
    ) -> Result<usize, ManifestError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut manifest = self.read()?;
        let now = Utc::now();
        let mut changed = 0;

        for (model, partitions) in affected {
            for partition in partitions {
                let Some(entry) = manifest.partitions.iter_mut().find(|p| &p.name == partition)
                else {
                    return Err(ManifestError::UnknownPartition(partition.clone()));
                };
                let Some(model_info) = entry.models.get_mut(model) else {
                    warn!(model = %model, partition = %partition, "Model not present in partition; skipping");
                    continue;
                };
                if !model_info.deleted {
                    model_info.deleted = true;
                    model_info.deleted_at = Some(now);
                    model_info.drop_reason = reason.map(|r| r.to_string());
                    changed += 1;
                }
            }
        }

        manifest.drops.push(DropAudit {
            performed_at: now,
            performed_by: performed_by.to_string(),
            config: config.to_string(),
            affected: affected.clone(),
        });
        self.write_snapshot(&manifest)?;
        info!(pairs = changed, by = %performed_by, "Recorded drop in manifest");
        Ok(changed)
    }

    /// Stage the manifest to a temp file and rename it into place.
    fn write_snapshot(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut staged = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut staged, manifest)?;
        staged.write_all(b"\n")?;
        staged
            .persist(&self.path)
            .map_err(|e| ManifestError::Persist(e.to_string()))?;
        Ok(())
    }
}
