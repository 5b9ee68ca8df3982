//! Deterministic document sampling for audit runs.
//!
//! Sample mode replaces upserts with a seeded reservoir sample of the
//! documents the run would have sent, written as a JSON audit file so
//! operators can eyeball text composition and metadata before a real
//! indexing pass.

use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use vectorize_types::{Document, Metadata};

use crate::error::IndexingError;

/// Longest text excerpt stored per sampled document.
const PREVIEW_CHARS: usize = 200;

/// One sampled document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    pub model: String,
    pub partition: String,
    pub row_index: u64,
    pub doc_id: String,
    pub text_preview: String,
    pub metadata: Metadata,
}

/// Reservoir sampler retaining a fixed number of random documents.
pub struct ReservoirSampler {
    capacity: usize,
    rng: StdRng,
    items: Vec<SampleRecord>,
    seen: u64,
}

impl ReservoirSampler {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            capacity,
            rng: StdRng::seed_from_u64(seed),
            items: Vec::with_capacity(capacity),
            seen: 0,
        }
    }

    /// Offer one document to the reservoir.
    pub fn offer(&mut self, model: &str, partition: &str, row_index: u64, document: &Document) {
        if self.capacity == 0 {
            return;
        }
        self.seen += 1;
        let record = SampleRecord {
            model: model.to_string(),
            partition: partition.to_string(),
            row_index,
            doc_id: document.id.clone(),
            text_preview: document.text.chars().take(PREVIEW_CHARS).collect(),
            metadata: document.metadata.clone(),
        };
        if self.items.len() < self.capacity {
            self.items.push(record);
            return;
        }
        let j = self.rng.gen_range(0..self.seen);
        if (j as usize) < self.capacity {
            self.items[j as usize] = record;
        }
    }

    /// Documents offered so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Take the retained samples.
    pub fn into_records(self) -> Vec<SampleRecord> {
        self.items
    }
}

/// Write sampled records as a JSON audit file, atomically.
pub fn write_samples(
    out_root: &Path,
    partition: &str,
    collection: &str,
    records: &[SampleRecord],
) -> Result<PathBuf, IndexingError> {
    let dir = out_root.join(partition);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{collection}_samples.json"));
    let mut staged = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut staged, records)?;
    staged.write_all(b"\n")?;
    staged
        .persist(&path)
        .map_err(|e| IndexingError::Persist(e.to_string()))?;
    info!(path = %path.display(), samples = records.len(), "Wrote sample audit file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(i: u64) -> Document {
        Document {
            id: format!("Table:{i:016x}"),
            text: format!("document number {i}"),
            metadata: Metadata::new(),
            token_count: 3,
        }
    }

    #[test]
    fn test_keeps_everything_under_capacity() {
        let mut sampler = ReservoirSampler::new(10, 7);
        for i in 0..5 {
            sampler.offer("Table", "partition_00001", i + 1, &doc(i));
        }
        assert_eq!(sampler.seen(), 5);
        assert_eq!(sampler.into_records().len(), 5);
    }

    #[test]
    fn test_caps_at_capacity_and_is_deterministic() {
        let run = |seed: u64| {
            let mut sampler = ReservoirSampler::new(3, seed);
            for i in 0..100 {
                sampler.offer("Table", "partition_00001", i + 1, &doc(i));
            }
            sampler
                .into_records()
                .into_iter()
                .map(|r| r.doc_id)
                .collect::<Vec<_>>()
        };
        let a = run(42);
        let b = run(42);
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut sampler = ReservoirSampler::new(0, 1);
        sampler.offer("Table", "partition_00001", 1, &doc(1));
        assert!(sampler.into_records().is_empty());
    }

    #[test]
    fn test_write_samples() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![SampleRecord {
            model: "Table".to_string(),
            partition: "partition_00001".to_string(),
            row_index: 5,
            doc_id: "Table:0000000000000005".to_string(),
            text_preview: "preview".to_string(),
            metadata: Metadata::new(),
        }];
        let path = write_samples(dir.path(), "partition_00001", "corpus", &records).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        let loaded: Vec<SampleRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].row_index, 5);
    }
}
