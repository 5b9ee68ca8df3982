//! Crash-and-resume behaviour: byte-accurate restart, checkpoint
//! invariants, and status recovery.

use pretty_assertions::assert_eq;

use e2e_tests::TestHarness;
use vectorize_indexing::{
    classify_model, partition_status, read_error_reports, CollectionStrategy, ModelStatus,
    PartitionIndexer, ResumeStore,
};
use vectorize_store::{Filter, VectorStore};
use vectorize_types::Settings;

fn indexer(harness: &TestHarness, settings: Settings) -> PartitionIndexer {
    let strategy = CollectionStrategy::from_settings(&settings).unwrap();
    PartitionIndexer::new(
        harness.registry.clone(),
        harness.store.clone(),
        harness.counter.clone(),
        strategy,
        settings,
    )
}

#[tokio::test]
async fn test_resume_after_mid_run_failure() {
    let harness = TestHarness::new();
    let tables = harness.write_table_csv("Table.csv", 1_000);
    let entry = harness.register_partition(&[("Table", &tables)]);

    // Run 1: five 100-row flushes succeed, the sixth dies.
    harness.store.fail_upserts_in("corpus", 6);
    let mut settings = harness.settings(100);
    settings.resume = true;
    let err = indexer(&harness, settings.clone())
        .index_partition(&entry)
        .await
        .unwrap_err();
    assert!(err.is_transient());

    let resume_store = ResumeStore::new(&harness.out_root(), &entry.name, "corpus");
    let state = resume_store.load();
    let table = &state["Table"];
    assert_eq!(table.row_index, 500);
    assert!(table.file_offset > 0);
    assert!(!table.complete);
    assert!(table.started);
    assert_eq!(table.collection_count, 500);
    assert_eq!(harness.store.count("corpus", None).await.unwrap(), 500);

    let errors_dir = harness.out_root().join(&entry.name).join("errors");
    let reports = read_error_reports(&errors_dir, "Table");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].reason, "threshold-reached");
    assert_eq!(reports[0].batch_size, 100);
    assert_eq!(reports[0].resume_state.row_index, 500);

    // While the failure is ahead of the checkpoint the model is errored.
    let status = partition_status(
        &harness.out_root(),
        &entry.name,
        "corpus",
        &["Table".to_string()],
    );
    assert_eq!(status.models["Table"], ModelStatus::Errored);

    // Run 2 with resume: the remaining 500 rows land, nothing is re-sent.
    harness.store.clear_upsert_failures();
    indexer(&harness, settings)
        .index_partition(&entry)
        .await
        .unwrap();

    let state = resume_store.load();
    let table = &state["Table"];
    assert_eq!(table.row_index, 1_000);
    assert!(table.complete);
    assert_eq!(table.collection_count, 1_000);
    assert_eq!(
        table.file_offset,
        std::fs::metadata(&tables).unwrap().len()
    );
    assert_eq!(
        harness
            .store
            .count(
                "corpus",
                Some(&Filter::Eq("model_name".into(), "Table".into()))
            )
            .await
            .unwrap(),
        1_000
    );

    // The error file stays, but progress past it flips the status back.
    assert_eq!(read_error_reports(&errors_dir, "Table").len(), 1);
    let status = partition_status(
        &harness.out_root(),
        &entry.name,
        "corpus",
        &["Table".to_string()],
    );
    assert_eq!(status.models["Table"], ModelStatus::Complete);
}

#[tokio::test]
async fn test_interrupted_and_clean_runs_converge() {
    // Crash mid-run, then resume: the store must end up with exactly the
    // documents a single uninterrupted run produces.
    let interrupted = TestHarness::new();
    let tables = interrupted.write_table_csv("Table.csv", 120);
    let entry = interrupted.register_partition(&[("Table", &tables)]);
    let mut settings = interrupted.settings(25);
    settings.resume = true;

    interrupted.store.fail_upserts_in("corpus", 3);
    indexer(&interrupted, settings.clone())
        .index_partition(&entry)
        .await
        .unwrap_err();
    interrupted.store.clear_upsert_failures();
    indexer(&interrupted, settings)
        .index_partition(&entry)
        .await
        .unwrap();

    let clean = TestHarness::new();
    let tables2 = clean.write_table_csv("Table.csv", 120);
    let entry2 = clean.register_partition(&[("Table", &tables2)]);
    indexer(&clean, clean.settings(25))
        .index_partition(&entry2)
        .await
        .unwrap();

    let mut interrupted_ids = interrupted.store.collection_ids("corpus");
    let mut clean_ids = clean.store.collection_ids("corpus");
    interrupted_ids.sort();
    clean_ids.sort();
    assert_eq!(interrupted_ids, clean_ids);
    assert_eq!(interrupted_ids.len(), 120);
}

#[tokio::test]
async fn test_changed_source_restarts_model() {
    let harness = TestHarness::new();
    let tables = harness.write_table_csv("Table.csv", 10);
    let entry = harness.register_partition(&[("Table", &tables)]);
    let mut settings = harness.settings(5);
    settings.resume = true;

    indexer(&harness, settings.clone())
        .index_partition(&entry)
        .await
        .unwrap();
    assert_eq!(harness.store.count("corpus", None).await.unwrap(), 10);

    // Rewrite the source in place with more rows; the stored signature
    // no longer matches, so the complete model restarts from offset 0.
    harness.write_table_csv("Table.csv", 12);
    let stats = indexer(&harness, settings)
        .index_partition(&entry)
        .await
        .unwrap();

    // All 12 rows re-read; the 10 existing ids dedupe away.
    assert_eq!(stats.documents_indexed["Table"], 2);
    assert_eq!(harness.store.count("corpus", None).await.unwrap(), 12);
}

#[tokio::test]
async fn test_status_recovery_is_pure_classification() {
    // An error recorded at row 500 with resume progressed to 700
    // classifies as started, not errored.
    use vectorize_indexing::ModelResumeState;

    let state = ModelResumeState {
        started: true,
        row_index: 700,
        ..ModelResumeState::default()
    };
    assert_eq!(classify_model(Some(&state), Some(500)), ModelStatus::Started);
    assert_eq!(classify_model(Some(&state), Some(700)), ModelStatus::Errored);
}
