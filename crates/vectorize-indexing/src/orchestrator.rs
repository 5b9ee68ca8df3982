//! Bounded parallel execution of partition indexers.
//!
//! At most `width` partitions run at a time, one worker per partition,
//! each internally sequential. A failing partition never cancels its
//! siblings; after all first attempts finish, partitions that failed
//! with a transient class get exactly one retry.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use vectorize_manifest::PartitionEntry;

use crate::error::{ErrorClass, IndexingError};
use crate::indexer::{PartitionIndexer, PartitionStats};

/// Result of one partition's indexing attempt(s).
#[derive(Debug)]
pub struct PartitionOutcome {
    pub partition: String,
    /// 1 for a clean first run, 2 when the transient retry ran
    pub attempts: u32,
    pub result: Result<PartitionStats, IndexingError>,
}

impl PartitionOutcome {
    pub fn failed(&self) -> bool {
        self.result.is_err()
    }
}

/// Aggregate outcome of an orchestrated run.
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<PartitionOutcome>,
}

impl RunReport {
    /// True when every partition completed.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| !o.failed())
    }

    /// Total documents upserted across partitions.
    pub fn total_documents(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| s.total_documents())
            .sum()
    }
}

/// Runs partition indexers with bounded fan-out and one transient retry.
pub struct Orchestrator {
    indexer: Arc<PartitionIndexer>,
    width: usize,
}

impl Orchestrator {
    pub fn new(indexer: Arc<PartitionIndexer>, width: usize) -> Self {
        Self {
            indexer,
            width: width.max(1),
        }
    }

    /// Index all partitions; never cancels siblings on failure.
    pub async fn run(&self, partitions: Vec<PartitionEntry>) -> RunReport {
        info!(
            partitions = partitions.len(),
            width = self.width,
            "Starting orchestrated indexing run"
        );
        let semaphore = Arc::new(Semaphore::new(self.width));
        let mut handles = Vec::with_capacity(partitions.len());

        for entry in partitions {
            let indexer = self.indexer.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                // Semaphore closed only on runtime shutdown.
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = indexer.index_partition(&entry).await;
                (entry, result)
            }));
        }

        let mut outcomes = Vec::new();
        let mut retry_queue: Vec<PartitionEntry> = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((entry, Ok(stats))) => outcomes.push(PartitionOutcome {
                    partition: entry.name,
                    attempts: 1,
                    result: Ok(stats),
                }),
                Ok((entry, Err(e))) => {
                    if e.class() == ErrorClass::Transient {
                        warn!(
                            partition = %entry.name,
                            error = %e,
                            "Partition failed with a transient error; queued for one retry"
                        );
                        retry_queue.push(entry);
                    } else {
                        error!(
                            partition = %entry.name,
                            class = e.class().as_str(),
                            error = %e,
                            "Partition failed"
                        );
                        outcomes.push(PartitionOutcome {
                            partition: entry.name,
                            attempts: 1,
                            result: Err(e),
                        });
                    }
                }
                Err(join_error) => {
                    error!(error = %join_error, "Partition worker panicked");
                    outcomes.push(PartitionOutcome {
                        partition: "<unknown>".to_string(),
                        attempts: 1,
                        result: Err(IndexingError::SourceFormat(format!(
                            "worker panicked: {join_error}"
                        ))),
                    });
                }
            }
        }

        // Retries run after all other work, sequentially.
        for entry in retry_queue {
            info!(partition = %entry.name, "Retrying partition");
            let result = self.indexer.index_partition(&entry).await;
            if let Err(e) = &result {
                error!(partition = %entry.name, error = %e, "Partition retry failed");
            }
            outcomes.push(PartitionOutcome {
                partition: entry.name,
                attempts: 2,
                result,
            });
        }

        let report = RunReport { outcomes };
        if report.all_succeeded() {
            info!(
                partitions = report.outcomes.len(),
                documents = report.total_documents(),
                "Indexing run succeeded"
            );
        } else {
            let failed = report.outcomes.iter().filter(|o| o.failed()).count();
            error!(failed = failed, "Indexing run finished with failures");
        }
        report
    }
}
