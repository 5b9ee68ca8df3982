//! On-disk shape of the partition manifest.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// File name of the manifest inside its root directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Per-model bookkeeping inside one partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionModel {
    /// Schema version the prepared file was produced under
    pub schema_version: u32,

    /// Prepared CSV for this model
    pub source_path: String,

    /// Digest sidecar written next to the prepared file
    pub digest_path: String,

    /// Set when the model's rows were dropped from the store
    #[serde(default)]
    pub deleted: bool,

    /// When the drop was applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    /// Operator-supplied reason for the drop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<String>,
}

/// One registered partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionEntry {
    /// Monotonic identifier, e.g. `partition_00037`
    pub name: String,

    /// When the sanitiser produced this partition
    pub created_at: DateTime<Utc>,

    /// Per-model prepared files and versions
    pub models: BTreeMap<String, PartitionModel>,

    /// Earlier partitions this one replaces
    #[serde(default)]
    pub replaces: Vec<String>,

    /// Superseded by a replacement; data pending removal
    #[serde(default)]
    pub stale: bool,
}

/// Audit record appended for every applied drop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropAudit {
    /// When the drop ran
    pub performed_at: DateTime<Utc>,

    /// Operator or process identity
    pub performed_by: String,

    /// Drop plan file the operation came from
    pub config: String,

    /// Model name to affected partition names
    pub affected: BTreeMap<String, Vec<String>>,
}

/// Global registry of partitions plus drop audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version
    pub version: u32,

    /// Registered partitions in allocation order
    #[serde(default)]
    pub partitions: Vec<PartitionEntry>,

    /// Applied drop operations
    #[serde(default)]
    pub drops: Vec<DropAudit>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            partitions: Vec::new(),
            drops: Vec::new(),
        }
    }
}

impl Manifest {
    /// Find a partition entry by name.
    pub fn partition(&self, name: &str) -> Option<&PartitionEntry> {
        self.partitions.iter().find(|p| p.name == name)
    }

    /// Numeric suffix of the highest allocated partition name.
    pub fn max_partition_index(&self) -> u32 {
        self.partitions
            .iter()
            .filter_map(|p| parse_partition_index(&p.name))
            .max()
            .unwrap_or(0)
    }

    /// Allocate the next monotonic partition name.
    pub fn next_partition_name(&self) -> String {
        format!("partition_{:05}", self.max_partition_index() + 1)
    }
}

/// Parse the numeric suffix of a `partition_NNNNN` name.
pub fn parse_partition_index(name: &str) -> Option<u32> {
    name.strip_prefix("partition_")?.parse().ok()
}
