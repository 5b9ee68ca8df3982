//! The partition indexer: streams one partition's models into a
//! collection with byte-accurate resume and fail-stop error handling.
//!
//! Each model is read sequentially; resume state advances only on a
//! successful flush, pointing at the last row the flush contained.
//! The first irrecoverable failure stops the whole partition; the only
//! inline retry is a single duplicate-id reconciliation per upsert.

use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use vectorize_manifest::PartitionEntry;
use vectorize_store::{Filter, GetRequest, StoreError, VectorStore};
use vectorize_tokens::TokenCounter;
use vectorize_types::{format_count, ModelRegistry, ModelSpec, Settings};

use crate::batch::{BatchAggregator, Flush, PendingDocument};
use crate::builder::{BuildContext, DocumentBuilder};
use crate::collection::CollectionStrategy;
use crate::error::IndexingError;
use crate::report::ErrorReport;
use crate::resume::{ModelResumeState, ResumeMap, ResumeStore, SourceSignature};
use crate::sample::{write_samples, ReservoirSampler, SampleRecord};

/// Outcome of indexing one partition.
#[derive(Debug, Default, Clone)]
pub struct PartitionStats {
    /// New documents upserted per model
    pub documents_indexed: BTreeMap<String, u64>,
    /// Batches flushed across all models
    pub batches: u64,
    /// Models skipped (no source, unchanged, or dropped)
    pub models_skipped: u64,
}

impl PartitionStats {
    /// Total new documents across models.
    pub fn total_documents(&self) -> u64 {
        self.documents_indexed.values().sum()
    }
}

/// Streams partitions into vector store collections.
pub struct PartitionIndexer {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn VectorStore>,
    counter: Arc<TokenCounter>,
    strategy: CollectionStrategy,
    settings: Settings,
    out_root: PathBuf,
}

impl PartitionIndexer {
    pub fn new(
        registry: Arc<ModelRegistry>,
        store: Arc<dyn VectorStore>,
        counter: Arc<TokenCounter>,
        strategy: CollectionStrategy,
        settings: Settings,
    ) -> Self {
        let out_root = PathBuf::from(&settings.out_root);
        Self {
            registry,
            store,
            counter,
            strategy,
            settings,
            out_root,
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.settings.store_deadline_ms)
    }

    /// Fully index one partition's models into its collection.
    pub async fn index_partition(
        &self,
        entry: &PartitionEntry,
    ) -> Result<PartitionStats, IndexingError> {
        let collection = self.strategy.collection_for(&entry.name);
        self.with_deadline(self.store.get_or_create_collection(&collection))
            .await?;

        let resume_store = ResumeStore::new(&self.out_root, &entry.name, &collection);
        let mut resume_map = resume_store.load();
        let mut stats = PartitionStats::default();
        let mut samples: Vec<SampleRecord> = Vec::new();

        for (model_name, partition_model) in &entry.models {
            if partition_model.deleted {
                info!(model = %model_name, partition = %entry.name, "Skipping dropped model");
                stats.models_skipped += 1;
                continue;
            }
            let spec = self.registry.get(model_name)?;
            let source_path = PathBuf::from(&partition_model.source_path);
            if !source_path.exists() {
                warn!(
                    model = %model_name,
                    path = %source_path.display(),
                    "Skipping model: prepared file does not exist"
                );
                stats.models_skipped += 1;
                continue;
            }

            let signature = SourceSignature::of(&source_path);
            let mut state = if self.settings.resume {
                resume_map.get(model_name).cloned().unwrap_or_default()
            } else {
                ModelResumeState::default()
            };

            if self.settings.resume && state.complete {
                if signature.is_some() && state.source_signature == signature {
                    info!(
                        model = %model_name,
                        partition = %entry.name,
                        "Skipping model: source unchanged since last complete index"
                    );
                    stats.models_skipped += 1;
                    continue;
                }
                info!(
                    model = %model_name,
                    partition = %entry.name,
                    "Re-indexing model: source changed since last complete index"
                );
                state = ModelResumeState::default();
            }

            if self.settings.resume && state.started && state.collection_count == 0 {
                let existing = self
                    .with_deadline(self.store.count(
                        &collection,
                        Some(&Filter::Eq("model_name".into(), model_name.as_str().into())),
                    ))
                    .await?;
                if existing > 0 {
                    info!(
                        model = %model_name,
                        existing = %format_count(existing),
                        "Seeded collection count from store scan"
                    );
                    state.collection_count = existing as u64;
                }
            }

            let run = ModelRun {
                model: model_name,
                spec,
                collection: &collection,
                partition: &entry.name,
                schema_version: partition_model.schema_version,
                source_path: &source_path,
                signature,
            };
            let added = self
                .index_model(&run, &mut state, &mut resume_map, &resume_store, &mut stats, &mut samples)
                .await?;
            stats.documents_indexed.insert(model_name.clone(), added);
        }

        if self.settings.sample_mode.is_some() {
            write_samples(&self.out_root, &entry.name, &collection, &samples)?;
        }

        info!(
            partition = %entry.name,
            collection = %collection,
            documents = %format_count(stats.total_documents() as usize),
            batches = stats.batches,
            "Partition indexing complete"
        );
        Ok(stats)
    }

    /// Stream one model file through the aggregator into the store.
    async fn index_model(
        &self,
        run: &ModelRun<'_>,
        state: &mut ModelResumeState,
        resume_map: &mut ResumeMap,
        resume_store: &ResumeStore,
        stats: &mut PartitionStats,
        samples: &mut Vec<SampleRecord>,
    ) -> Result<u64, IndexingError> {
        let builder = DocumentBuilder::new(
            run.spec.clone(),
            self.counter.clone(),
            self.settings.truncation_strategy,
            self.settings.api_token_limit,
        );
        let mut aggregator = BatchAggregator::new(
            self.settings.effective_batch_size_docs(),
            self.settings.batch_size_tokens,
        );
        let context = BuildContext {
            partition_name: run.partition.to_string(),
            schema_version: run.schema_version,
            source_path: run.source_path.display().to_string(),
        };

        // Byte-exact resume needs both the offset and the header row the
        // offset was recorded under; otherwise fall back to row skipping.
        let start_offset = if state.file_offset > 0 && state.fieldnames.is_some() {
            state.file_offset
        } else {
            0
        };
        let skip_rows = if start_offset == 0 { state.row_index } else { 0 };

        let mut file = std::fs::File::open(run.source_path)?;
        if start_offset > 0 {
            file.seek(SeekFrom::Start(start_offset))?;
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(start_offset == 0)
            .from_reader(file);

        let headers: Vec<String> = if start_offset == 0 {
            let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
            if headers.is_empty() {
                return Err(IndexingError::SourceFormat(format!(
                    "no header row in {}",
                    run.source_path.display()
                )));
            }
            state.fieldnames = Some(headers.clone());
            headers
        } else {
            state.fieldnames.clone().unwrap_or_default()
        };

        match (start_offset, skip_rows) {
            (0, 0) => info!(model = %run.model, path = %run.source_path.display(), "Indexing model"),
            (0, rows) => info!(
                model = %run.model,
                path = %run.source_path.display(),
                skip_rows = %format_count(rows as usize),
                "Indexing model, skipping previously indexed rows"
            ),
            (offset, _) => info!(
                model = %run.model,
                path = %run.source_path.display(),
                offset = %format_count(offset as usize),
                "Indexing model, resuming from byte offset"
            ),
        }

        let mut sampler = self
            .settings
            .sample_mode
            .as_ref()
            .map(|s| ReservoirSampler::new(s.size, s.seed));
        let mut added: u64 = 0;
        let mut row_index: u64 = if start_offset > 0 { state.row_index } else { 0 };
        let mut record = csv::StringRecord::new();

        while reader.read_record(&mut record)? {
            row_index += 1;
            if skip_rows > 0 && row_index <= skip_rows {
                continue;
            }
            let source_offset = start_offset + reader.position().byte();

            let row = remap_row(&headers, &record, run.spec);
            let validated = match run.spec.schema.validate(run.model, &row) {
                Ok(validated) => validated,
                Err(e) => {
                    let err = IndexingError::Model(e);
                    let report = ErrorReport::for_validation(
                        run.model,
                        run.collection,
                        run.source_path,
                        row_index,
                        state,
                        &err,
                    );
                    report.write(&self.errors_dir(run.partition))?;
                    return Err(err);
                }
            };

            let Some(document) = builder.build(&validated, &context)? else {
                continue;
            };

            if let Some(sampler) = sampler.as_mut() {
                sampler.offer(run.model, run.partition, row_index, &document);
                continue;
            }

            let pending = PendingDocument {
                document,
                row_index,
                source_offset,
            };
            for flush in aggregator.push(pending) {
                added += self
                    .flush_batch(run, flush, state, resume_map, resume_store)
                    .await?;
                stats.batches += 1;
            }
        }

        if let Some(flush) = aggregator.finish() {
            added += self
                .flush_batch(run, flush, state, resume_map, resume_store)
                .await?;
            stats.batches += 1;
        }

        if let Some(sampler) = sampler.take() {
            debug!(model = %run.model, seen = sampler.seen(), "Sampled model stream");
            samples.extend(sampler.into_records());
            return Ok(0);
        }

        // All rows flushed: seal the model at the end of the source.
        state.complete = true;
        state.file_offset = std::fs::metadata(run.source_path)?.len();
        state.row_index = row_index.max(state.row_index);
        state.indexed_at = Some(Utc::now());
        state.source_signature = run.signature;
        resume_map.insert(run.model.to_string(), state.clone());
        resume_store.save(resume_map)?;

        info!(
            model = %run.model,
            partition = %run.partition,
            added = %format_count(added as usize),
            "Finished indexing model"
        );
        Ok(added)
    }

    /// Upsert one batch and persist the post-flush checkpoint.
    async fn flush_batch(
        &self,
        run: &ModelRun<'_>,
        mut flush: Flush,
        state: &mut ModelResumeState,
        resume_map: &mut ResumeMap,
        resume_store: &ResumeStore,
    ) -> Result<u64, IndexingError> {
        let last_position = flush.last_position();

        // Drop ids the collection already holds before paying for the
        // upsert; a failed pre-check is non-fatal.
        let ids: Vec<String> = flush.documents.iter().map(|d| d.document.id.clone()).collect();
        match self
            .with_deadline(self.store.get(
                run.collection,
                GetRequest {
                    ids: Some(ids),
                    ..GetRequest::default()
                },
            ))
            .await
        {
            Ok(existing) if !existing.is_empty() => {
                let existing_ids: std::collections::HashSet<&String> =
                    existing.ids.iter().collect();
                let before = flush.documents.len();
                flush
                    .documents
                    .retain(|d| !existing_ids.contains(&d.document.id));
                let removed = before - flush.documents.len();
                if removed > 0 {
                    let sample: Vec<&str> = existing
                        .ids
                        .iter()
                        .take(5)
                        .map(|s| s.as_str())
                        .collect();
                    info!(
                        model = %run.model,
                        removed = removed,
                        sample = ?sample,
                        "Removed already-present ids before upsert"
                    );
                    flush.token_total = flush
                        .documents
                        .iter()
                        .map(|d| d.document.token_count)
                        .sum();
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(model = %run.model, error = %e, "Duplicate pre-check failed; continuing");
            }
        }

        let mut upserted = 0u64;
        if !flush.is_empty() {
            match self.upsert_flush(run, &flush).await {
                Ok(count) => upserted = count,
                Err(err) => {
                    let report = ErrorReport::for_flush(
                        run.model,
                        run.collection,
                        run.source_path,
                        &flush,
                        state,
                        &err,
                    );
                    report.write(&self.errors_dir(run.partition))?;
                    return Err(err);
                }
            }
        }

        // The checkpoint points at the last row contained in this flush,
        // even if deduplication emptied the upsert itself.
        if let Some((row_index, file_offset)) = last_position {
            state.row_index = row_index;
            state.file_offset = file_offset;
        }
        state.started = true;
        state.documents_indexed += upserted;
        state.collection_count += upserted;
        state.indexed_at = Some(Utc::now());
        state.source_signature = run.signature;
        resume_map.insert(run.model.to_string(), state.clone());
        resume_store.save(resume_map)?;

        info!(
            model = %run.model,
            reason = %flush.reason,
            batch = flush.len(),
            tokens = %format_count(flush.token_total),
            total = %format_count(state.documents_indexed as usize),
            "Flushed batch"
        );
        Ok(upserted)
    }

    /// Single upsert with the duplicate-id reconciliation retry.
    async fn upsert_flush(&self, run: &ModelRun<'_>, flush: &Flush) -> Result<u64, IndexingError> {
        let mut documents: Vec<&PendingDocument> = flush.documents.iter().collect();

        let upsert = |docs: &[&PendingDocument]| {
            let ids: Vec<String> = docs.iter().map(|d| d.document.id.clone()).collect();
            let texts: Vec<String> = docs.iter().map(|d| d.document.text.clone()).collect();
            let metadatas: Vec<_> = docs.iter().map(|d| d.document.metadata.clone()).collect();
            let store = self.store.clone();
            let collection = run.collection.to_string();
            async move { store.upsert(&collection, &ids, &texts, &metadatas).await }
        };

        match self.with_deadline(upsert(&documents)).await {
            Ok(()) => Ok(documents.len() as u64),
            Err(StoreError::DuplicateId { ids }) if !ids.is_empty() => {
                let duplicates: std::collections::HashSet<String> = ids.into_iter().collect();
                let before = documents.len();
                documents.retain(|d| !duplicates.contains(&d.document.id));
                let removed = before - documents.len();
                warn!(
                    model = %run.model,
                    removed = removed,
                    "Store rejected duplicate ids; retrying once without them"
                );
                if documents.is_empty() {
                    return Ok(0);
                }
                self.with_deadline(upsert(&documents)).await?;
                Ok(documents.len() as u64)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn errors_dir(&self, partition: &str) -> PathBuf {
        self.out_root.join(partition).join("errors")
    }

    async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.deadline(), fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!(
                "store call exceeded {} ms",
                self.settings.store_deadline_ms
            ))),
        }
    }
}

/// Per-model context threaded through one indexing run.
struct ModelRun<'a> {
    model: &'a str,
    spec: &'a ModelSpec,
    collection: &'a str,
    partition: &'a str,
    schema_version: u32,
    source_path: &'a Path,
    signature: Option<SourceSignature>,
}

/// Map a CSV record onto schema field names, applying column renames.
pub(crate) fn remap_row(
    headers: &[String],
    record: &csv::StringRecord,
    spec: &ModelSpec,
) -> BTreeMap<String, String> {
    let raw: BTreeMap<&str, &str> = headers
        .iter()
        .map(|h| h.as_str())
        .zip(record.iter())
        .collect();
    spec.schema
        .fields
        .iter()
        .filter_map(|field| {
            let column = spec
                .columns
                .get(&field.name)
                .map(|c| c.as_str())
                .unwrap_or(field.name.as_str());
            raw.get(column)
                .map(|value| (field.name.clone(), value.to_string()))
        })
        .collect()
}
