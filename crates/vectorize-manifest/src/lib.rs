//! Partition manifest store and drop planning.
//!
//! The manifest is the single mutable shared file in the pipeline:
//! the registry of partitions, their per-model prepared files and schema
//! versions, replacement links, and the audit log of applied drops.
//! Writers are serialised; every write is staged and renamed.

pub mod drop;
pub mod error;
pub mod store;
pub mod types;

pub use drop::{generate_drop_plan, DropModelPlan, DropPlan};
pub use error::ManifestError;
pub use store::{ManifestStore, NewPartitionModel};
pub use types::{
    parse_partition_index, DropAudit, Manifest, PartitionEntry, PartitionModel, MANIFEST_FILENAME,
    MANIFEST_VERSION,
};
