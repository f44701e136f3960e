//! Command for summarizing pending papers.

use tracker::summarize::Summarizer;

use super::*;

/// Summarizes every paper awaiting a summary.
pub async fn summarize(config: Config) -> Result<()> {
  let store = open_store(&config).await?;
  let summarizer = Summarizer::from_config(&config)?;

  println!("{} Summarizing pending papers with {}", style(INFO_PREFIX).blue(), config.llm_model);
  let outcome = summarizer.summarize_pending(&store).await?;

  for (id, reason) in &outcome.failures {
    eprintln!("{} summarize failed for {id}: {reason}", style(WARNING_PREFIX).yellow());
  }
  println!("{} Summarized {} papers", style(SUCCESS_PREFIX).green(), outcome.summarized);

  if outcome.exhausted > 0 {
    return Err(TrackerdError::FailedPapers(outcome.exhausted));
  }
  Ok(())
}
