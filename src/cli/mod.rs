//! CLI module
//!
//! Provides:
//! - Argument parsing (clap derive)
//! - Configuration file resolution (flag → env → user config dir)
//! - Command dispatch with deterministic exit codes

pub mod args;
pub mod config_path;
pub mod dispatch;

pub use args::{
    ArtifactCommand, Args, Command, DatasetCommand, PipelineCommand, PredictArgs, TrainArgs,
};
pub use config_path::{load_config, resolve_config_path};
pub use dispatch::{exit_code_for, run_cli_mode, run_command, ExitCode};

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_STORAGE_ERROR: i32 = 2;
