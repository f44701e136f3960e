//! Command line interface for the tracker paper pipeline.
//!
//! This crate provides a CLI tool for driving the `tracker` library. It
//! supports operations like:
//! - Database and configuration initialization
//! - Fetching papers from arXiv for a date window
//! - Summarizing pending papers with a local LLM
//! - Rendering and saving daily Markdown reports
//! - Running the full fetch/filter/summarize/report pipeline
//!
//! # Usage
//!
//! ```bash
//! # Initialize the database and write a default config
//! tracker init
//!
//! # Fetch and score yesterday's papers
//! tracker fetch
//!
//! # Summarize everything awaiting a summary
//! tracker summarize
//!
//! # Render yesterday's report
//! tracker report
//!
//! # The whole pipeline in one go
//! tracker run
//! ```
//!
//! Commands exit non-zero when a run permanently fails any paper or
//! hits an unrecoverable error, so cron invocations surface problems.
//! The `-v` flag raises the logging verbosity.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{builder::ArgAction, Args, Parser, Subcommand};
use console::style;
use tracker::config::Config;
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod error;

use crate::{commands::*, error::*};

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for warning messages
static WARNING_PREFIX: &str = "⚠️ ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "CLI for the tracker paper pipeline")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Path to the configuration file. If not specified, uses the default
  /// platform-specific config directory.
  #[arg(long, short, global = true)]
  config: Option<PathBuf>,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,
}

/// Configures the logging system based on the verbosity level
///
/// The verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
fn setup_logging(verbosity: u8) {
  let filter = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_file(true)
    .with_line_number(true)
    .with_target(true)
    .init();
}

/// Dispatches the parsed command.
async fn dispatch(cli: Cli) -> Result<()> {
  let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
  let config = Config::from_path(&config_path)?;
  match cli.command.clone() {
    Commands::Init(options) => init(config_path, config, options).await,
    Commands::Fetch(options) => fetch(config, options).await,
    Commands::Summarize => summarize(config).await,
    Commands::Report(options) => report(config, options).await,
    Commands::Run(options) => run(config, options).await,
  }
}

/// Entry point for the tracker CLI application
///
/// Handles command line argument parsing, sets up logging, and executes
/// the requested command. Exits with status 1 on any error, including a
/// run that permanently failed papers.
#[tokio::main]
async fn main() {
  let cli = Cli::parse();
  setup_logging(cli.verbose);

  if let Err(e) = dispatch(cli).await {
    eprintln!("{} {e}", style(ERROR_PREFIX).red());
    std::process::exit(1);
  }
}
