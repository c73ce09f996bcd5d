//! sqldeps CLI - SQL workspace dependency index from the command line.
//!
//! The index is fed with scan results produced by an external SQL scanner
//! and answers freshness, orphan, missing-definition, and cycle queries.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod cli;

/// sqldeps: Cross-file dependency index for SQL workspaces.
#[derive(Parser)]
#[command(name = "sqldeps")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Workspace root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply scan results from a JSONL file (one file per line)
    Ingest {
        /// Path to the scan results
        input: PathBuf,
    },

    /// Remove files from the index
    Remove {
        /// Indexed file paths, as they appear in scan results
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Show how fresh the index is
    Status,

    /// Report orphaned definitions and missing references
    Report {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Detect circular dependencies between files
    Cycles,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let workspace = match cli.workspace {
        Some(w) => w,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!(
                    "{}: failed to get current directory: {e}",
                    "error".red().bold()
                );
                return ExitCode::FAILURE;
            }
        },
    };

    let result = match cli.command {
        Commands::Ingest { input } => cli::ingest::run(&workspace, &input).await,
        Commands::Remove { paths } => cli::remove::run(&workspace, &paths).await,
        Commands::Status => cli::status::run(&workspace).await,
        Commands::Report { json } => cli::report::run(&workspace, json).await,
        Commands::Cycles => cli::cycles::run(&workspace).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {cause}", "caused by".dimmed());
            }
            ExitCode::FAILURE
        }
    }
}
