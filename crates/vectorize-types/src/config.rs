//! Layered configuration for the vectorize pipeline.
//!
//! Sources are merged in order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Config file (`~/.config/vectorize/config.toml` or `--config`)
//! 3. Environment variables (`VECTORIZE_*`)
//! 4. CLI flags (applied by the binary after load)

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::TruncationStrategy;

/// Hard per-request token ceiling of the embedding API.
pub const MAX_TOKENS_PER_REQUEST: usize = 300_000;

/// Hard per-request document-count ceiling of the embedding API.
pub const MAX_DOCS_PER_REQUEST: usize = 2_048;

/// Which collection naming scheme the indexer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStrategyKind {
    /// One collection for every partition (local persistent stores)
    #[default]
    Single,
    /// One collection per partition (managed/cloud stores)
    PerPartition,
}

/// Deterministic sampling settings for audit runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSettings {
    /// Documents retained per model
    #[serde(default = "default_sample_size")]
    pub size: usize,

    /// RNG seed; fixed so repeated runs sample the same rows
    #[serde(default = "default_sample_seed")]
    pub seed: u64,
}

fn default_sample_size() -> usize {
    25
}

fn default_sample_seed() -> u64 {
    42
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self {
            size: default_sample_size(),
            seed: default_sample_seed(),
        }
    }
}

/// Main pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory holding per-partition output (resume state, errors)
    #[serde(default = "default_out_root")]
    pub out_root: String,

    /// Path to the model registry description file
    #[serde(default = "default_registry_path")]
    pub registry_path: String,

    /// Base collection name (single strategy) or prefix (per-partition)
    #[serde(default)]
    pub collection: Option<String>,

    /// Collection naming scheme
    #[serde(default)]
    pub collection_strategy: CollectionStrategyKind,

    /// Upper bound on documents per upsert
    #[serde(default = "default_batch_size_docs")]
    pub batch_size_docs: usize,

    /// Safety bound on the token sum per upsert
    #[serde(default = "default_batch_size_tokens")]
    pub batch_size_tokens: usize,

    /// Per-document hard token ceiling
    #[serde(default = "default_api_token_limit")]
    pub api_token_limit: usize,

    /// Default truncation strategy when no per-model override exists
    #[serde(default = "default_truncation_strategy")]
    pub truncation_strategy: TruncationStrategy,

    /// Orchestrator width: partitions indexed concurrently
    #[serde(default = "default_parallel_partitions")]
    pub parallel_partitions: usize,

    /// Skip completed models whose source signature is unchanged
    #[serde(default)]
    pub resume: bool,

    /// Drop stale partitions' data before reindexing replacements
    #[serde(default)]
    pub delete_stale: bool,

    /// Deterministic sampling; forces width 1 and suppresses upserts
    #[serde(default)]
    pub sample_mode: Option<SampleSettings>,

    /// Deadline applied to each vector-store network call, in milliseconds
    #[serde(default = "default_store_deadline_ms")]
    pub store_deadline_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_out_root() -> String {
    "out".to_string()
}

fn default_registry_path() -> String {
    "configs/models.json".to_string()
}

fn default_batch_size_docs() -> usize {
    128
}

fn default_batch_size_tokens() -> usize {
    // 5% below the per-request ceiling
    MAX_TOKENS_PER_REQUEST - MAX_TOKENS_PER_REQUEST / 20
}

fn default_api_token_limit() -> usize {
    8_192
}

fn default_truncation_strategy() -> TruncationStrategy {
    TruncationStrategy::Auto
}

fn default_parallel_partitions() -> usize {
    1
}

fn default_store_deadline_ms() -> u64 {
    120_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            out_root: default_out_root(),
            registry_path: default_registry_path(),
            collection: None,
            collection_strategy: CollectionStrategyKind::default(),
            batch_size_docs: default_batch_size_docs(),
            batch_size_tokens: default_batch_size_tokens(),
            api_token_limit: default_api_token_limit(),
            truncation_strategy: default_truncation_strategy(),
            parallel_partitions: default_parallel_partitions(),
            resume: false,
            delete_stale: false,
            sample_mode: None,
            store_deadline_ms: default_store_deadline_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Default config file location.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "vectorize").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load settings from defaults, config file, and environment.
    pub fn load(config_path: Option<&str>) -> Result<Self, ModelError> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        } else if let Some(default_path) = Self::default_config_path() {
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path));
            }
        }

        builder = builder.add_source(Environment::with_prefix("VECTORIZE").separator("__"));

        let config = builder
            .build()
            .map_err(|e| ModelError::Config(e.to_string()))?;
        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ModelError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.batch_size_docs == 0 {
            return Err(ModelError::Config(
                "batch_size_docs must be positive".to_string(),
            ));
        }
        if self.batch_size_tokens == 0 || self.batch_size_tokens > MAX_TOKENS_PER_REQUEST {
            return Err(ModelError::Config(format!(
                "batch_size_tokens must be within 1..={MAX_TOKENS_PER_REQUEST}"
            )));
        }
        if self.api_token_limit == 0 {
            return Err(ModelError::Config(
                "api_token_limit must be positive".to_string(),
            ));
        }
        if self.parallel_partitions == 0 {
            return Err(ModelError::Config(
                "parallel_partitions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective orchestrator width: sampling forces sequential runs.
    pub fn effective_parallelism(&self) -> usize {
        if self.sample_mode.is_some() {
            1
        } else {
            self.parallel_partitions
        }
    }

    /// Docs-per-upsert bound after applying the API ceiling.
    pub fn effective_batch_size_docs(&self) -> usize {
        self.batch_size_docs.min(MAX_DOCS_PER_REQUEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.batch_size_docs, 128);
        assert_eq!(settings.api_token_limit, 8_192);
        assert_eq!(settings.batch_size_tokens, 285_000);
        assert_eq!(settings.truncation_strategy, TruncationStrategy::Auto);
        assert_eq!(settings.parallel_partitions, 1);
        assert!(!settings.resume);
        settings.validate().unwrap();
    }

    #[test]
    fn test_sample_mode_forces_width_one() {
        let mut settings = Settings {
            parallel_partitions: 8,
            ..Settings::default()
        };
        assert_eq!(settings.effective_parallelism(), 8);
        settings.sample_mode = Some(SampleSettings::default());
        assert_eq!(settings.effective_parallelism(), 1);
    }

    #[test]
    fn test_batch_size_capped_at_api_limit() {
        let settings = Settings {
            batch_size_docs: 10_000,
            ..Settings::default()
        };
        assert_eq!(settings.effective_batch_size_docs(), MAX_DOCS_PER_REQUEST);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let settings = Settings {
            batch_size_docs: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_token_budget() {
        let settings = Settings {
            batch_size_tokens: MAX_TOKENS_PER_REQUEST + 1,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
