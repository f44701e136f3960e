//! CLI subcommands and the plumbing they share.

use chrono::Duration;
use tracker::{
  config::DateWindow,
  datetime,
  pipeline::{Pipeline, RunSummary},
  prelude::PaperSource,
  store::Store,
};

use super::*;

pub mod fetch;
pub mod init;
pub mod report;
pub mod run;
pub mod summarize;

pub use fetch::{fetch, FetchOptions};
pub use init::{init, InitOptions};
pub use report::{report, ReportOptions};
pub use run::{run, RunOptions};
pub use summarize::summarize;

/// Available commands for the CLI
#[derive(Subcommand, Clone)]
pub enum Commands {
  /// Initialize the database, report directory, and default config
  Init(InitOptions),

  /// Fetch and score papers from arXiv for a date window
  Fetch(FetchOptions),

  /// Summarize every paper awaiting a summary
  Summarize,

  /// Render and save the Markdown report for a date window
  Report(ReportOptions),

  /// Run the full pipeline: fetch, filter, summarize, report
  Run(RunOptions),
}

/// Resolves the date window for a command: the given date, or yesterday
/// by default since a cron run this morning wants yesterday's papers.
/// The clock-skew check only runs when no date was given.
async fn window_for(config: &Config, date: Option<NaiveDate>) -> DateWindow {
  let end = match date {
    Some(date) => date,
    None => datetime::current_date().await - Duration::days(1),
  };
  DateWindow::lookback(end, config.lookback_days)
}

/// Opens the configured store with the configured retry budget.
async fn open_store(config: &Config) -> Result<Store> {
  Ok(Store::open(&config.database_path).await?.with_retry_budget(config.retry_budget))
}

/// Prints every partial failure a run accumulated.
fn print_failures(summary: &RunSummary) {
  for note in &summary.failures {
    eprintln!(
      "{} {} failed for {}: {}",
      style(WARNING_PREFIX).yellow(),
      note.stage,
      note.subject,
      note.reason
    );
  }
}
