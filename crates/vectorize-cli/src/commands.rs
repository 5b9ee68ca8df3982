//! Command implementations for the vectorize binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use vectorize_indexing::{
    apply_drop_plan, delete_stale_partitions, partition_status, validate_partition_sources,
    CollectionStrategy, Orchestrator, PartitionIndexer,
};
use vectorize_manifest::{generate_drop_plan, DropPlan, ManifestStore, PartitionEntry};
use vectorize_query::{build_query_config, QueryConfig};
use vectorize_store::{InMemoryStore, VectorStore};
use vectorize_tokens::TokenCounter;
use vectorize_types::{
    format_count, CollectionStrategyKind, ModelRegistry, SampleSettings, Settings,
};

/// Shared CLI overrides applied after `Settings::load`.
#[derive(Debug, Default)]
pub struct SettingsOverrides {
    pub resume: bool,
    pub parallel: Option<usize>,
    pub delete_stale: bool,
    pub sample: bool,
    pub collection: Option<String>,
    pub strategy: Option<String>,
}

/// Load settings, apply CLI overrides, and validate the result.
pub fn load_settings(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    overrides: SettingsOverrides,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if overrides.resume {
        settings.resume = true;
    }
    if let Some(parallel) = overrides.parallel {
        settings.parallel_partitions = parallel;
    }
    if overrides.delete_stale {
        settings.delete_stale = true;
    }
    if overrides.sample {
        settings.sample_mode = Some(SampleSettings::default());
    }
    if let Some(collection) = overrides.collection {
        settings.collection = Some(collection);
    }
    if let Some(strategy) = overrides.strategy {
        settings.collection_strategy = match strategy.as_str() {
            "single" => CollectionStrategyKind::Single,
            "per_partition" => CollectionStrategyKind::PerPartition,
            other => bail!("unknown collection strategy '{other}'"),
        };
    }
    if let Some(level) = log_level_override {
        settings.log_level = level.to_string();
    }
    settings.validate()?;
    Ok(settings)
}

/// Initialise the tracing subscriber from settings and `RUST_LOG`.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn load_registry(settings: &Settings) -> Result<Arc<ModelRegistry>> {
    let registry = ModelRegistry::load(Path::new(&settings.registry_path))
        .with_context(|| format!("Failed to load model registry {}", settings.registry_path))?;
    info!(models = registry.len(), "Model registry loaded");
    Ok(Arc::new(registry))
}

fn select_partitions(
    manifest_store: &ManifestStore,
    requested: &[String],
) -> Result<Vec<PartitionEntry>> {
    let manifest = manifest_store.read()?;
    let selected: Vec<PartitionEntry> = if requested.is_empty() {
        manifest
            .partitions
            .iter()
            .filter(|p| !p.stale)
            .cloned()
            .collect()
    } else {
        let mut selected = Vec::new();
        for name in requested {
            match manifest.partition(name) {
                Some(entry) => selected.push(entry.clone()),
                None => bail!("partition '{name}' is not in the manifest"),
            }
        }
        selected
    };
    if selected.is_empty() {
        warn!("No partitions selected; nothing to do");
    }
    Ok(selected)
}

/// The store backend used by the CLI.
///
/// Production deployments implement [`VectorStore`] over their vector
/// database server; the built-in backend keeps everything in process.
fn open_store() -> Arc<dyn VectorStore> {
    Arc::new(InMemoryStore::new())
}

/// Run the orchestrated indexing command.
pub async fn run_index(settings: Settings, manifest_path: &str, partitions: &[String]) -> Result<()> {
    let registry = load_registry(&settings)?;
    let manifest_store = ManifestStore::new(manifest_path);
    let selected = select_partitions(&manifest_store, partitions)?;
    let strategy = CollectionStrategy::from_settings(&settings)?;
    let store = open_store();

    if settings.delete_stale {
        let manifest = manifest_store.read()?;
        let cleaned = delete_stale_partitions(&store, &strategy, &manifest).await?;
        if !cleaned.is_empty() {
            info!(partitions = cleaned.len(), "Removed stale partition data");
        }
    }

    let width = settings.effective_parallelism();
    let indexer = Arc::new(PartitionIndexer::new(
        registry,
        store,
        Arc::new(TokenCounter::new()),
        strategy,
        settings,
    ));
    let report = Orchestrator::new(indexer, width).run(selected).await;

    println!(
        "Indexed {} document(s) across {} partition(s)",
        format_count(report.total_documents() as usize),
        report.outcomes.len()
    );
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(stats) => println!(
                "  {} ok ({} docs, {} batches)",
                outcome.partition,
                format_count(stats.total_documents() as usize),
                stats.batches
            ),
            Err(e) => println!(
                "  {} FAILED after {} attempt(s): {e}",
                outcome.partition, outcome.attempts
            ),
        }
    }
    if !report.all_succeeded() {
        bail!("one or more partitions failed");
    }
    Ok(())
}

/// Print per-model status for every selected partition.
pub fn run_status(settings: Settings, manifest_path: &str) -> Result<()> {
    let registry = load_registry(&settings)?;
    let manifest_store = ManifestStore::new(manifest_path);
    let manifest = manifest_store.read()?;
    let strategy = CollectionStrategy::from_settings(&settings)?;
    let out_root = PathBuf::from(&settings.out_root);

    for entry in &manifest.partitions {
        let collection = strategy.collection_for(&entry.name);
        let models: Vec<String> = entry
            .models
            .keys()
            .filter(|m| registry.get(m).is_ok())
            .cloned()
            .collect();
        let status = partition_status(&out_root, &entry.name, &collection, &models);
        println!("{} -> {}", entry.name, collection);
        for (model, model_status) in &status.models {
            println!("  {model}: {model_status}");
        }
    }
    Ok(())
}

/// Build and write the query routing config.
pub fn run_query_config(settings: Settings, output: &str) -> Result<()> {
    let config = build_query_config(
        Path::new(&settings.out_root),
        settings.collection.as_deref(),
    )?;
    config.save(Path::new(output))?;
    println!(
        "Query config: {} model(s) across {} collection(s) -> {output}",
        config.metadata.total_models, config.metadata.total_collections
    );
    Ok(())
}

/// Generate a drop plan from the manifest.
pub fn run_drop_plan(
    manifest_path: &str,
    models: &[String],
    before: Option<&str>,
    after: Option<&str>,
    reason: Option<&str>,
    output: &str,
) -> Result<()> {
    let manifest_store = ManifestStore::new(manifest_path);
    let manifest = manifest_store.read()?;
    let plan = generate_drop_plan(
        &manifest,
        Path::new(manifest_path),
        models,
        before,
        after,
        reason,
    );
    if plan.is_empty() {
        println!("No model-partition pairs matched; nothing to plan");
        return Ok(());
    }
    plan.save(Path::new(output))?;
    for (model, entry) in &plan.models {
        println!(
            "{model}: {} partition(s), schema version(s) {:?}",
            entry.partitions.len(),
            entry.schema_versions
        );
    }
    println!("Drop plan written to {output}");
    Ok(())
}

/// Apply (or dry-run) a drop plan.
pub async fn run_drop_apply(
    settings: Settings,
    manifest_path: &str,
    plan_path: &str,
    apply: bool,
) -> Result<()> {
    let strategy = CollectionStrategy::from_settings(&settings)?;
    let manifest_store = ManifestStore::new(manifest_path);
    let plan = DropPlan::load(Path::new(plan_path))?;
    let store = open_store();
    let performed_by = std::env::var("USER").unwrap_or_else(|_| "vectorize".to_string());

    let effects = apply_drop_plan(
        &store,
        &strategy,
        &manifest_store,
        &plan,
        Path::new(plan_path),
        &performed_by,
        apply,
    )
    .await?;

    let label = if apply { "dropped" } else { "would drop" };
    for effect in &effects {
        println!(
            "{label} {} rows of {} from {} ({})",
            effect.removed, effect.model, effect.collection, effect.partition
        );
    }
    if !apply {
        println!("Dry run; re-run with --apply to mutate the store and manifest");
    }
    Ok(())
}

/// Validate prepared sources for every manifest partition.
pub fn run_validate(settings: Settings, manifest_path: &str) -> Result<()> {
    let registry = load_registry(&settings)?;
    let manifest_store = ManifestStore::new(manifest_path);
    let manifest = manifest_store.read()?;

    let mut all_valid = true;
    for entry in &manifest.partitions {
        let results = validate_partition_sources(&registry, entry)?;
        for result in results {
            match &result.failure {
                None => println!(
                    "{} {} ok ({} row(s))",
                    entry.name,
                    result.model,
                    format_count(result.rows_checked as usize)
                ),
                Some((row, message)) => {
                    all_valid = false;
                    println!("{} {} FAILED at row {row}: {message}", entry.name, result.model);
                }
            }
        }
    }
    if !all_valid {
        bail!("validation failed");
    }
    Ok(())
}

/// Emit a stub per-model source mapping.
pub fn run_init_config(settings: Settings, output: Option<&str>) -> Result<()> {
    let registry = load_registry(&settings)?;

    let mut stub = BTreeMap::new();
    for (name, spec) in registry.iter() {
        let columns: BTreeMap<&str, &str> = spec
            .schema
            .field_order()
            .into_iter()
            .map(|f| (f, f))
            .collect();
        stub.insert(
            name.to_string(),
            serde_json::json!({ "path": "", "columns": columns }),
        );
    }
    let body = serde_json::to_string_pretty(&stub)?;
    match output {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, format!("{body}\n"))?;
            println!("Stub config written to {path}");
        }
        None => println!("{body}"),
    }
    Ok(())
}

/// Load a previously generated query config (used by library callers).
pub fn load_query_config(path: &str) -> Result<QueryConfig> {
    Ok(QueryConfig::load(Path::new(path))?)
}
