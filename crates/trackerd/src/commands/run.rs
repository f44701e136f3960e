//! Command for running the complete pipeline.

use super::*;

/// Arguments for the `run` command.
#[derive(Args, Clone)]
pub struct RunOptions {
  /// Date to run the pipeline for (YYYY-MM-DD); defaults to yesterday
  #[arg(long, short)]
  pub date:      Option<NaiveDate>,

  /// Skip report generation
  #[arg(long)]
  pub no_report: bool,

  /// Print the run summary as JSON instead of the human-readable form
  #[arg(long)]
  pub json:      bool,
}

/// Runs fetch, filter, summarize, and report in order, then records and
/// prints the run summary.
pub async fn run(config: Config, options: RunOptions) -> Result<()> {
  let window = window_for(&config, options.date).await;
  let store = open_store(&config).await?;
  let pipeline = Pipeline::from_config(&config, store.clone(), window)?;

  let mut summary = RunSummary::new();
  pipeline.run_fetch(&mut summary).await?;
  pipeline.run_filter(&mut summary).await?;
  pipeline.run_summarize(&mut summary).await?;

  if !options.no_report {
    let report = pipeline.run_report(&mut summary).await?;
    if !report.papers.is_empty() {
      let path = config.reports_dir.join(format!("{}.md", window.end));
      std::fs::create_dir_all(&config.reports_dir)?;
      std::fs::write(&path, report.to_markdown())?;
      println!("{} Report saved to {:?}", style(SUCCESS_PREFIX).green(), path);
    }
  }

  store.record_run(&summary).await?;

  if options.json {
    println!("{}", serde_json::to_string_pretty(&summary)?);
  } else {
    print_failures(&summary);
    println!(
      "{} Run complete: {} fetched, {} filtered, {} skipped, {} summarized, {} reported",
      style(SUCCESS_PREFIX).green(),
      summary.fetched,
      summary.filtered,
      summary.skipped,
      summary.summarized,
      summary.reported,
    );
  }

  if summary.has_failed_papers() {
    return Err(TrackerdError::FailedPapers(summary.failed));
  }
  Ok(())
}
