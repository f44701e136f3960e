//! Command for rendering and saving daily reports.

use super::*;

/// Arguments for the `report` command.
#[derive(Args, Clone)]
pub struct ReportOptions {
  /// Date for the report (YYYY-MM-DD); defaults to yesterday
  #[arg(long, short)]
  pub date:   Option<NaiveDate>,

  /// Output file path (default: <reports_dir>/YYYY-MM-DD.md)
  #[arg(long, short)]
  pub output: Option<PathBuf>,
}

/// Builds the window's report, saves it, and advances the included
/// papers to the reported stage.
pub async fn report(config: Config, options: ReportOptions) -> Result<()> {
  let window = window_for(&config, options.date).await;
  let store = open_store(&config).await?;
  let pipeline = Pipeline::from_config(&config, store, window)?;

  let mut summary = RunSummary::new();
  let report = pipeline.run_report(&mut summary).await?;
  if report.papers.is_empty() {
    println!(
      "{} No papers found for {} to {}",
      style(WARNING_PREFIX).yellow(),
      window.start,
      window.end
    );
    return Ok(());
  }

  let path = options
    .output
    .unwrap_or_else(|| config.reports_dir.join(format!("{}.md", window.end)));
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(&path, report.to_markdown())?;

  println!(
    "{} Report over {} papers saved to {:?}",
    style(SUCCESS_PREFIX).green(),
    report.stats.total,
    path
  );
  Ok(())
}
