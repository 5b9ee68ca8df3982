//! Vectorize
//!
//! Streams prepared tabular partitions into a vector store with
//! resumable checkpoints, and maintains the query routing config.
//!
//! # Usage
//!
//! ```bash
//! vectorize index --manifest data/manifest.json --collection corpus --resume
//! vectorize status --manifest data/manifest.json --collection corpus
//! vectorize query-config --output configs/query_config.json
//! vectorize drop plan --manifest data/manifest.json --model Table --before 2026-03-01
//! vectorize drop apply --manifest data/manifest.json --plan configs/drop/plan.json --apply
//! vectorize validate --manifest data/manifest.json
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/vectorize/config.toml)
//! 3. Environment variables (VECTORIZE_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use vectorize_cli::{
    init_logging, load_settings, run_drop_apply, run_drop_plan, run_index, run_init_config,
    run_query_config, run_status, run_validate, Cli, Commands, DropCommands, SettingsOverrides,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            manifest,
            partition,
            resume,
            parallel,
            delete_stale,
            sample,
            collection,
            strategy,
        } => {
            let settings = load_settings(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                SettingsOverrides {
                    resume,
                    parallel,
                    delete_stale,
                    sample,
                    collection,
                    strategy,
                },
            )?;
            init_logging(&settings)?;
            run_index(settings, &manifest, &partition).await?;
        }
        Commands::Status {
            manifest,
            collection,
            strategy,
        } => {
            let settings = load_settings(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                SettingsOverrides {
                    collection,
                    strategy,
                    ..SettingsOverrides::default()
                },
            )?;
            init_logging(&settings)?;
            run_status(settings, &manifest)?;
        }
        Commands::QueryConfig { output } => {
            let settings = load_settings(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                SettingsOverrides::default(),
            )?;
            init_logging(&settings)?;
            run_query_config(settings, &output)?;
        }
        Commands::Drop { command } => match command {
            DropCommands::Plan {
                manifest,
                model,
                before,
                after,
                reason,
                output,
            } => {
                let settings = load_settings(
                    cli.config.as_deref(),
                    cli.log_level.as_deref(),
                    SettingsOverrides::default(),
                )?;
                init_logging(&settings)?;
                run_drop_plan(
                    &manifest,
                    &model,
                    before.as_deref(),
                    after.as_deref(),
                    reason.as_deref(),
                    &output,
                )?;
            }
            DropCommands::Apply {
                manifest,
                plan,
                apply,
                collection,
                strategy,
            } => {
                let settings = load_settings(
                    cli.config.as_deref(),
                    cli.log_level.as_deref(),
                    SettingsOverrides {
                        collection,
                        strategy,
                        ..SettingsOverrides::default()
                    },
                )?;
                init_logging(&settings)?;
                run_drop_apply(settings, &manifest, &plan, apply).await?;
            }
        },
        Commands::Validate { manifest } => {
            let settings = load_settings(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                SettingsOverrides::default(),
            )?;
            init_logging(&settings)?;
            run_validate(settings, &manifest)?;
        }
        Commands::InitConfig { output } => {
            let settings = load_settings(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                SettingsOverrides::default(),
            )?;
            init_logging(&settings)?;
            run_init_config(settings, output.as_deref())?;
        }
    }

    Ok(())
}
