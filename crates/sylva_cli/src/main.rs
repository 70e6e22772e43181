//! Sylva CLI
//!
//! Command-line tools for persisted hierarchy indexes.
//!
//! # Commands
//!
//! - `build` - Build a storage part from a JSON node list
//! - `inspect` - Display the tree stored in a storage part
//! - `verify` - Check a storage part against the index invariants

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Sylva command-line hierarchy tools.
#[derive(Parser)]
#[command(name = "sylva")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a storage part from a JSON array of {"id", "parent"} records
    Build {
        /// JSON node list
        #[arg(short, long)]
        input: PathBuf,

        /// Storage part to write
        #[arg(short, long)]
        output: PathBuf,

        /// Key of the index within its owning collection
        #[arg(short = 'k', long, default_value = "1")]
        index_key: i32,
    },

    /// Display the tree stored in a storage part
    Inspect {
        /// Storage part to read
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check a storage part against the index invariants
    Verify {
        /// Storage part to read
        file: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Build {
            input,
            output,
            index_key,
        } => commands::build::run(&input, &output, index_key),
        Commands::Inspect { file, format } => commands::inspect::run(&file, format),
        Commands::Verify { file } => commands::verify::run(&file),
        Commands::Version => {
            println!("Sylva CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Sylva Core v{}", sylva_core::VERSION);
            println!(
                "Storage format v{}",
                sylva_core::STORAGE_FORMAT_VERSION
            );
            Ok(())
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
