//! Run orchestration across the fetch, filter, summarize, and report
//! stages.
//!
//! The [`Pipeline`] invokes each stage in order, feeding every stage
//! only the store's current pending set so already-advanced work is
//! never redone. Stages accumulate partial failures into a
//! [`RunSummary`] without halting the run; a stage with nothing to do
//! is a no-op pass-through. Only store durability failures abort a run,
//! and progress committed by earlier stages always stands since every
//! advancement is durable and per-paper.

use crate::{
  config::{Config, DateWindow},
  fetch::{ArxivFetcher, PaperSource},
  filter::KeywordPolicy,
  paper::Stage,
  report::{Report, ReportBuilder},
  store::{StageFields, Store},
  summarize::Summarizer,
};

use super::*;

/// The pipeline stage a failure note belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
  /// Feed retrieval and upsert.
  Fetch,
  /// Relevance scoring.
  Filter,
  /// Summary generation.
  Summarize,
  /// Report construction and stage advancement.
  Report,
}

impl Display for RunStage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RunStage::Fetch => write!(f, "fetch"),
      RunStage::Filter => write!(f, "filter"),
      RunStage::Summarize => write!(f, "summarize"),
      RunStage::Report => write!(f, "report"),
    }
  }
}

/// One reason-tagged partial failure recorded during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureNote {
  /// Stage the failure occurred in.
  pub stage:   RunStage,
  /// What failed: a paper identifier, or a category for fetch-level
  /// failures.
  pub subject: String,
  /// Human-readable reason.
  pub reason:  String,
}

/// Counts and failure notes accumulated over one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
  /// When the run started.
  pub started_at: DateTime<Utc>,
  /// Papers retrieved from the feed.
  pub fetched:    usize,
  /// Papers newly inserted or updated by the upsert.
  pub updated:    usize,
  /// Feed entries dropped for missing or malformed fields.
  pub rejected:   usize,
  /// Papers that passed the relevance filter.
  pub filtered:   usize,
  /// Papers skipped as irrelevant.
  pub skipped:    usize,
  /// Papers summarized.
  pub summarized: usize,
  /// Papers included in the report and advanced to reported.
  pub reported:   usize,
  /// Papers that exhausted their retry budget this run.
  pub failed:     usize,
  /// Every partial failure, reason-tagged.
  pub failures:   Vec<FailureNote>,
}

impl RunSummary {
  /// Creates an empty summary stamped with the current time.
  pub fn new() -> Self {
    Self {
      started_at: Utc::now(),
      fetched:    0,
      updated:    0,
      rejected:   0,
      filtered:   0,
      skipped:    0,
      summarized: 0,
      reported:   0,
      failed:     0,
      failures:   Vec::new(),
    }
  }

  /// Whether any paper was permanently failed during this run.
  pub fn has_failed_papers(&self) -> bool { self.failed > 0 }

  /// Records one partial failure.
  pub fn note_failure(&mut self, stage: RunStage, subject: impl Into<String>, reason: impl Into<String>) {
    self.failures.push(FailureNote { stage, subject: subject.into(), reason: reason.into() });
  }
}

impl Default for RunSummary {
  fn default() -> Self { Self::new() }
}

/// Orchestrates one end-to-end run over a date window.
///
/// # Examples
///
/// ```no_run
/// # use tracker::{config::{Config, DateWindow}, pipeline::Pipeline, store::Store};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let store = Store::open(&config.database_path).await?;
/// let pipeline = Pipeline::from_config(&config, store, DateWindow::single_day("2024-01-15".parse()?))?;
/// let (summary, report) = pipeline.run().await?;
/// println!("summarized {} papers", summary.summarized);
/// println!("{}", report.to_markdown());
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
  /// Lifecycle state, shared with every stage.
  store:      Store,
  /// Where candidate papers come from.
  source:     Box<dyn PaperSource>,
  /// Relevance scoring policy.
  policy:     KeywordPolicy,
  /// Summary generation driver.
  summarizer: Summarizer,
  /// Date window this run covers.
  window:     DateWindow,
}

impl Pipeline {
  /// Creates a pipeline from explicit components.
  pub fn new(
    store: Store,
    source: Box<dyn PaperSource>,
    policy: KeywordPolicy,
    summarizer: Summarizer,
    window: DateWindow,
  ) -> Self {
    Self { store, source, policy, summarizer, window }
  }

  /// Creates a pipeline with the production fetcher and Ollama
  /// summarizer from configuration.
  pub fn from_config(config: &Config, store: Store, window: DateWindow) -> Result<Self> {
    Ok(Self::new(
      store,
      Box::new(ArxivFetcher::from_config(config)?),
      KeywordPolicy::new(config.keywords.clone(), config.relevance_threshold),
      Summarizer::from_config(config)?,
      window,
    ))
  }

  /// The date window this pipeline covers.
  pub fn window(&self) -> &DateWindow { &self.window }

  /// Runs every stage in order and records the run summary.
  ///
  /// Partial failures accumulate in the summary; only store durability
  /// failures return an error, and work committed before the failure
  /// stands.
  pub async fn run(&self) -> Result<(RunSummary, Report)> {
    let mut summary = RunSummary::new();

    self.run_fetch(&mut summary).await?;
    self.run_filter(&mut summary).await?;
    self.run_summarize(&mut summary).await?;
    let report = self.run_report(&mut summary).await?;

    self.store.record_run(&summary).await?;
    Ok((summary, report))
  }

  /// Fetches the window's papers and upserts them into the store.
  pub async fn run_fetch(&self, summary: &mut RunSummary) -> Result<()> {
    let report = match self.source.fetch(&self.window).await {
      Ok(report) => report,
      Err(e) if e.is_fatal() => return Err(e),
      Err(e) => {
        warn!("Fetch stage failed entirely: {e}");
        summary.note_failure(RunStage::Fetch, "feed", e.to_string());
        return Ok(());
      },
    };

    summary.fetched = report.papers.len();
    summary.rejected = report.rejected;
    for (category, reason) in report.failures {
      summary.note_failure(RunStage::Fetch, category, reason);
    }

    let changed = self.store.upsert_fetched(report.papers).await?;
    summary.updated = changed.len();
    debug!("Fetch stage complete: {} papers, {} new or updated", summary.fetched, summary.updated);
    Ok(())
  }

  /// Scores every fetched paper and advances it to filtered or skipped.
  pub async fn run_filter(&self, summary: &mut RunSummary) -> Result<()> {
    let pending = self.store.get_pending(Stage::Fetched).await?;
    for paper in pending {
      let (relevance_score, matched_terms) = self.policy.score(&paper);
      let to = if self.policy.passes(relevance_score) { Stage::Filtered } else { Stage::Skipped };
      let fields = StageFields::Scored { relevance_score, matched_terms };

      match self.store.advance(&paper.id, Stage::Fetched, to, fields).await {
        Ok(()) =>
          if to == Stage::Filtered {
            summary.filtered += 1;
          } else {
            summary.skipped += 1;
          },
        Err(TrackerError::StaleStage { id, .. }) => {
          trace!("Skipping {id}, already filtered concurrently");
        },
        Err(e) => return Err(e),
      }
    }
    debug!("Filter stage complete: {} filtered, {} skipped", summary.filtered, summary.skipped);
    Ok(())
  }

  /// Summarizes every filtered paper.
  pub async fn run_summarize(&self, summary: &mut RunSummary) -> Result<()> {
    let outcome = self.summarizer.summarize_pending(&self.store).await?;
    summary.summarized = outcome.summarized;
    summary.failed += outcome.exhausted;
    for (id, reason) in outcome.failures {
      summary.note_failure(RunStage::Summarize, id, reason);
    }
    debug!("Summarize stage complete: {} summarized", summary.summarized);
    Ok(())
  }

  /// Builds the window's report and advances its summarized papers to
  /// reported.
  pub async fn run_report(&self, summary: &mut RunSummary) -> Result<Report> {
    let report = ReportBuilder::new(self.store.clone()).build(self.window.start, self.window.end).await?;

    for paper in &report.papers {
      if paper.stage != Stage::Summarized {
        continue;
      }
      match self.store.advance(&paper.id, Stage::Summarized, Stage::Reported, StageFields::None).await {
        Ok(()) => summary.reported += 1,
        Err(TrackerError::StaleStage { id, .. }) => {
          trace!("Skipping {id}, already reported concurrently");
        },
        Err(e) => return Err(e),
      }
    }
    debug!("Report stage complete: {} papers reported", summary.reported);
    Ok(report)
  }
}
