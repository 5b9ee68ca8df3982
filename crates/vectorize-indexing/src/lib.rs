//! Partitioned, fail-stop, resumable streaming ingestion.
//!
//! The crate wires prepared partition CSVs through validation, document
//! building, token-budget truncation, and batch flushing into a vector
//! store, checkpointing after every successful flush. The orchestrator
//! runs partitions in bounded parallel; status classification and
//! store-side maintenance (stale cleanup, drops) live here too.

pub mod batch;
pub mod builder;
pub mod collection;
pub mod error;
pub mod indexer;
pub mod maintenance;
pub mod orchestrator;
pub mod report;
pub mod resume;
pub mod sample;
pub mod status;
pub mod validate;

pub use batch::{BatchAggregator, Flush, FlushReason, PendingDocument};
pub use builder::{BuildContext, DocumentBuilder};
pub use collection::CollectionStrategy;
pub use error::{ErrorClass, IndexingError};
pub use indexer::{PartitionIndexer, PartitionStats};
pub use maintenance::{apply_drop_plan, delete_stale_partitions, DropEffect};
pub use orchestrator::{Orchestrator, PartitionOutcome, RunReport};
pub use report::{read_error_reports, ErrorReport};
pub use resume::{ModelResumeState, ResumeMap, ResumeStore, SourceSignature, RESUME_FILE_SUFFIX};
pub use sample::{write_samples, ReservoirSampler, SampleRecord};
pub use status::{classify_model, partition_status, ModelStatus, PartitionStatus};
pub use validate::validate_partition_sources;
