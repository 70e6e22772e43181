//! CLI command implementations.

pub mod build;
pub mod inspect;
pub mod verify;

use clap::ValueEnum;
use sylva_core::CoreError;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The index or storage layer rejected the input.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The node list is not valid JSON.
    #[error("invalid node list: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading the input failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input is well-formed but cannot be used.
    #[error("{0}")]
    Input(String),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// How reports are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}
