//! Library surface of the vectorize binary.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, DropCommands};
pub use commands::{
    init_logging, load_query_config, load_settings, run_drop_apply, run_drop_plan, run_index,
    run_init_config, run_query_config, run_status, run_validate, SettingsOverrides,
};
