//! CLI argument parsing for the vectorize binary.

use clap::{Parser, Subcommand};

/// Vectorize
///
/// Config-driven indexing pipeline that streams prepared tabular
/// partitions into a vector store, with resumable checkpoints and a
/// multi-collection query layer.
#[derive(Parser, Debug)]
#[command(name = "vectorize")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides ~/.config/vectorize/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Pipeline commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index manifest partitions into the vector store
    Index {
        /// Manifest file describing the partitions
        #[arg(short, long)]
        manifest: String,

        /// Restrict the run to these partitions (default: all live ones)
        #[arg(short, long)]
        partition: Vec<String>,

        /// Skip completed models whose source is unchanged
        #[arg(long)]
        resume: bool,

        /// Partitions indexed concurrently
        #[arg(long)]
        parallel: Option<usize>,

        /// Remove stale partitions' data before indexing
        #[arg(long)]
        delete_stale: bool,

        /// Deterministic sampling audit run (no upserts, width 1)
        #[arg(long)]
        sample: bool,

        /// Collection name (single strategy) or prefix (per-partition)
        #[arg(long)]
        collection: Option<String>,

        /// Collection strategy: single | per_partition
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Show per-model indexing status for manifest partitions
    Status {
        /// Manifest file describing the partitions
        #[arg(short, long)]
        manifest: String,

        /// Collection name (single strategy) or prefix (per-partition)
        #[arg(long)]
        collection: Option<String>,

        /// Collection strategy: single | per_partition
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Build the query routing config from resume checkpoints
    QueryConfig {
        /// Where to write the config
        #[arg(short, long, default_value = "configs/query_config.json")]
        output: String,
    },

    /// Plan or apply model-centric drops
    Drop {
        #[command(subcommand)]
        command: DropCommands,
    },

    /// Validate prepared sources against their model schemas
    Validate {
        /// Manifest file describing the partitions
        #[arg(short, long)]
        manifest: String,
    },

    /// Emit a stub per-model source mapping for operators to fill in
    InitConfig {
        /// Where to write the stub (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Drop subcommands
#[derive(Subcommand, Debug)]
pub enum DropCommands {
    /// Generate a drop plan from the manifest
    Plan {
        /// Manifest file describing the partitions
        #[arg(short, long)]
        manifest: String,

        /// Models to drop
        #[arg(long, required = true)]
        model: Vec<String>,

        /// Only partitions created before this date (YYYY-MM-DD)
        #[arg(long)]
        before: Option<String>,

        /// Only partitions created on or after this date (YYYY-MM-DD)
        #[arg(long)]
        after: Option<String>,

        /// Reason recorded with the drop
        #[arg(long)]
        reason: Option<String>,

        /// Where to write the plan
        #[arg(short, long, default_value = "configs/drop/plan.json")]
        output: String,
    },

    /// Apply a drop plan to the store and the manifest
    Apply {
        /// Manifest file describing the partitions
        #[arg(short, long)]
        manifest: String,

        /// Drop plan to apply
        #[arg(long)]
        plan: String,

        /// Actually mutate the store and manifest (dry run otherwise)
        #[arg(long)]
        apply: bool,

        /// Collection name (single strategy) or prefix (per-partition)
        #[arg(long)]
        collection: Option<String>,

        /// Collection strategy: single | per_partition
        #[arg(long)]
        strategy: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_flags() {
        let cli = Cli::parse_from([
            "vectorize",
            "index",
            "--manifest",
            "data/manifest.json",
            "--resume",
            "--parallel",
            "4",
            "--collection",
            "corpus",
        ]);
        match cli.command {
            Commands::Index {
                manifest,
                resume,
                parallel,
                collection,
                ..
            } => {
                assert_eq!(manifest, "data/manifest.json");
                assert!(resume);
                assert_eq!(parallel, Some(4));
                assert_eq!(collection.as_deref(), Some("corpus"));
            }
            _ => panic!("Expected Index command"),
        }
    }

    #[test]
    fn test_drop_plan_requires_model() {
        let result = Cli::try_parse_from(["vectorize", "drop", "plan", "--manifest", "m.json"]);
        assert!(result.is_err());

        let cli = Cli::parse_from([
            "vectorize",
            "drop",
            "plan",
            "--manifest",
            "m.json",
            "--model",
            "Table",
            "--before",
            "2026-03-01",
        ]);
        match cli.command {
            Commands::Drop {
                command: DropCommands::Plan { model, before, .. },
            } => {
                assert_eq!(model, vec!["Table"]);
                assert_eq!(before.as_deref(), Some("2026-03-01"));
            }
            _ => panic!("Expected Drop Plan command"),
        }
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::parse_from([
            "vectorize",
            "--log-level",
            "debug",
            "query-config",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::QueryConfig { .. }));
    }
}
