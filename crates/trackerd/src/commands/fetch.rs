//! Command for fetching and scoring papers.

use tracker::fetch::ArxivFetcher;

use super::*;

/// Arguments for the `fetch` command.
#[derive(Args, Clone)]
pub struct FetchOptions {
  /// Date to fetch papers for (YYYY-MM-DD); defaults to yesterday
  #[arg(long, short)]
  pub date:    Option<NaiveDate>,

  /// Fetch and display papers without touching the database
  #[arg(long)]
  pub dry_run: bool,
}

/// Fetches the window's papers into the store and scores them.
pub async fn fetch(config: Config, options: FetchOptions) -> Result<()> {
  let window = window_for(&config, options.date).await;
  println!(
    "{} Fetching papers for {} to {}",
    style(INFO_PREFIX).blue(),
    window.start,
    window.end
  );

  if options.dry_run {
    let fetched = ArxivFetcher::from_config(&config)?.fetch(&window).await?;
    println!(
      "{} Dry run: found {} papers ({} rejected entries)",
      style(INFO_PREFIX).blue(),
      fetched.papers.len(),
      fetched.rejected,
    );
    for paper in fetched.papers.iter().take(10) {
      println!("  {}  {}", paper.id, paper.title);
    }
    return Ok(());
  }

  let store = open_store(&config).await?;
  let pipeline = Pipeline::from_config(&config, store, window)?;

  let mut summary = RunSummary::new();
  pipeline.run_fetch(&mut summary).await?;
  pipeline.run_filter(&mut summary).await?;
  print_failures(&summary);

  println!(
    "{} Fetched {} papers ({} new or updated): {} relevant, {} skipped",
    style(SUCCESS_PREFIX).green(),
    summary.fetched,
    summary.updated,
    summary.filtered,
    summary.skipped,
  );
  Ok(())
}
