//! Full indexing pipeline: partition CSVs through validation, document
//! building, batching, and upserts into the store.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use e2e_tests::TestHarness;
use vectorize_indexing::{CollectionStrategy, PartitionIndexer};
use vectorize_store::{Filter, GetRequest, VectorStore};
use vectorize_types::MetadataValue;

fn indexer(harness: &TestHarness, settings: vectorize_types::Settings) -> PartitionIndexer {
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
async fn test_full_partition_run() {
    let harness = TestHarness::new();
    let tables = harness.write_table_csv("partition_data/Table.csv", 25);
    let fields = harness.write_field_csv("partition_data/Field.csv", 40);
    let entry = harness.register_partition(&[("Table", &tables), ("Field", &fields)]);

    let settings = harness.settings(10);
    let stats = indexer(&harness, settings)
        .index_partition(&entry)
        .await
        .unwrap();

    assert_eq!(stats.documents_indexed["Table"], 25);
    assert_eq!(stats.documents_indexed["Field"], 40);
    assert_eq!(harness.store.count("corpus", None).await.unwrap(), 65);

    // Metadata carries the fixed keys
    let table_docs = harness
        .store
        .get(
            "corpus",
            GetRequest {
                filter: Some(Filter::Eq("model_name".into(), "Table".into())),
                ..GetRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(table_docs.len(), 25);
    for metadata in &table_docs.metadatas {
        assert_eq!(
            metadata.get("partition_name"),
            Some(&MetadataValue::Str(entry.name.clone()))
        );
        assert_eq!(metadata.get("schema_version"), Some(&MetadataValue::Int(1)));
        assert_eq!(metadata.get("has_sem"), Some(&MetadataValue::Bool(true)));
        assert!(metadata.contains_key("table_name"));
    }
    for id in &table_docs.ids {
        assert!(id.starts_with("Table:"));
    }
}

#[tokio::test]
async fn test_every_document_respects_token_limit() {
    let harness = TestHarness::new();
    // One row gets a description far over a small token limit
    let path = harness.dir.path().join("Table.csv");
    let mut body = String::from("table_name,description,row_count\n");
    body.push_str("SMALL,tiny description,1\n");
    body.push_str(&format!("HUGE,{},2\n", "verbose words ".repeat(500)));
    std::fs::write(&path, body).unwrap();
    let entry = harness.register_partition(&[("Table", &path)]);

    let mut settings = harness.settings(10);
    settings.api_token_limit = 64;
    indexer(&harness, settings)
        .index_partition(&entry)
        .await
        .unwrap();

    let docs = harness
        .store
        .get("corpus", GetRequest::default())
        .await
        .unwrap();
    assert_eq!(docs.len(), 2);
    for (text, metadata) in docs.documents.iter().zip(&docs.metadatas) {
        assert!(harness.counter.count(text) <= 64);
        if metadata.get("truncated") == Some(&MetadataValue::Bool(true)) {
            assert!(metadata.contains_key("original_tokens"));
            assert!(metadata.contains_key("truncation_strategy"));
        }
    }
}

#[tokio::test]
async fn test_rerun_with_resume_is_a_noop() {
    let harness = TestHarness::new();
    let tables = harness.write_table_csv("Table.csv", 30);
    let entry = harness.register_partition(&[("Table", &tables)]);

    let mut settings = harness.settings(10);
    settings.resume = true;
    let indexer = Arc::new(indexer(&harness, settings));

    indexer.index_partition(&entry).await.unwrap();
    let upserts_after_first = harness.store.upsert_call_count();
    assert_eq!(harness.store.count("corpus", None).await.unwrap(), 30);

    let stats = indexer.index_partition(&entry).await.unwrap();
    assert_eq!(stats.total_documents(), 0);
    assert_eq!(stats.models_skipped, 1);
    assert_eq!(harness.store.upsert_call_count(), upserts_after_first);
    assert_eq!(harness.store.count("corpus", None).await.unwrap(), 30);
}

#[tokio::test]
async fn test_document_ids_stable_across_runs() {
    let harness = TestHarness::new();
    let tables = harness.write_table_csv("Table.csv", 10);
    let entry = harness.register_partition(&[("Table", &tables)]);

    indexer(&harness, harness.settings(5))
        .index_partition(&entry)
        .await
        .unwrap();
    let first_ids = harness.store.collection_ids("corpus");

    // Fresh harness state, same rows: ids must be identical
    let second = TestHarness::new();
    let tables2 = second.write_table_csv("Table.csv", 10);
    let entry2 = second.register_partition(&[("Table", &tables2)]);
    indexer(&second, second.settings(5))
        .index_partition(&entry2)
        .await
        .unwrap();

    assert_eq!(first_ids, second.store.collection_ids("corpus"));
}

#[tokio::test]
async fn test_validation_failure_stops_partition() {
    let harness = TestHarness::new();
    let path = harness.dir.path().join("Table.csv");
    // Second row is missing the required table_name
    std::fs::write(
        &path,
        "table_name,description,row_count\nTAB1,first,1\n,broken,2\nTAB3,third,3\n",
    )
    .unwrap();
    let entry = harness.register_partition(&[("Table", &path)]);

    let err = indexer(&harness, harness.settings(10))
        .index_partition(&entry)
        .await
        .unwrap_err();
    assert_eq!(err.class(), vectorize_indexing::ErrorClass::Validation);

    let errors_dir = harness.out_root().join(&entry.name).join("errors");
    let reports = vectorize_indexing::read_error_reports(&errors_dir, "Table");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].reason, "validation");
    assert_eq!(reports[0].row_numbers, vec![2]);
}

#[tokio::test]
async fn test_sample_mode_suppresses_upserts() {
    let harness = TestHarness::new();
    let tables = harness.write_table_csv("Table.csv", 50);
    let entry = harness.register_partition(&[("Table", &tables)]);

    let mut settings = harness.settings(10);
    settings.sample_mode = Some(vectorize_types::SampleSettings {
        size: 5,
        seed: 99,
    });
    let stats = indexer(&harness, settings)
        .index_partition(&entry)
        .await
        .unwrap();

    assert_eq!(stats.total_documents(), 0);
    assert_eq!(harness.store.upsert_call_count(), 0);

    let samples_path = harness
        .out_root()
        .join(&entry.name)
        .join("corpus_samples.json");
    let raw = std::fs::read_to_string(samples_path).unwrap();
    let samples: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(samples.as_array().unwrap().len(), 5);
}
