//! Markdown report construction over summarized papers.
//!
//! The [`ReportBuilder`] pulls qualifying papers from the store, ranks
//! them, and renders a Markdown document for the requested date range.
//! It is side-effect free: writing the document to disk and advancing
//! the included papers to their reported stage are the pipeline's
//! responsibility.
//!
//! Ranking is fully deterministic so two builds over the same stored
//! papers render byte-identical documents: relevance score descending,
//! then published date descending, then identifier ascending.

use std::fmt::Write as _;

use crate::{paper::Paper, store::Store};

use super::*;

/// Number of papers given a full section before the remainder collapses
/// into a one-line list.
const TOP_PAPER_COUNT: usize = 5;

/// Aggregate statistics over the papers in a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
  /// Total papers in the report.
  pub total:         usize,
  /// Papers carrying a summary.
  pub summarized:    usize,
  /// Mean relevance score over scored papers, zero when none are
  /// scored.
  pub average_score: f64,
}

/// A ranked report over a date range.
#[derive(Debug, Clone)]
pub struct Report {
  /// First published date included, inclusive.
  pub start:  NaiveDate,
  /// Last published date included, inclusive.
  pub end:    NaiveDate,
  /// Papers in ranked order.
  pub papers: Vec<Paper>,
  /// Aggregate statistics.
  pub stats:  ReportStats,
}

impl Report {
  /// Renders the report as a Markdown document.
  pub fn to_markdown(&self) -> String {
    let mut out = String::new();
    let title_date =
      if self.start == self.end { self.end.to_string() } else { format!("{} to {}", self.start, self.end) };

    let _ = writeln!(out, "# Daily Paper Report - {title_date}\n");
    let _ = writeln!(out, "**Total Papers**: {}\n", self.stats.total);
    let _ = writeln!(out, "---\n");

    let _ = writeln!(out, "## Statistics\n");
    let _ = writeln!(out, "- **Total papers collected**: {}", self.stats.total);
    let _ = writeln!(out, "- **Papers with summaries**: {}", self.stats.summarized);
    let _ = writeln!(out, "- **Average relevance score**: {:.1}/10\n", self.stats.average_score);
    let _ = writeln!(out, "---\n");

    let _ = writeln!(out, "## Top Papers\n");
    for (rank, paper) in self.papers.iter().take(TOP_PAPER_COUNT).enumerate() {
      let _ = writeln!(out, "### {}. {}\n", rank + 1, paper.title);
      let _ = writeln!(out, "**Authors**: {}\n", paper.authors.join(", "));
      let _ = writeln!(out, "**Published**: {}\n", paper.published);
      match paper.relevance_score {
        Some(score) => {
          let _ = writeln!(out, "**Relevance Score**: {score}/10\n");
        },
        None => {
          let _ = writeln!(out, "**Relevance Score**: N/A\n");
        },
      }

      if let Some(summary) = &paper.summary {
        let _ = writeln!(out, "**Summary**: {summary}\n");
      }
      if let Some(key_points) = &paper.key_points {
        let _ = writeln!(out, "**Key Points**:");
        for point in key_points {
          let _ = writeln!(out, "- {point}");
        }
        let _ = writeln!(out);
      }

      let _ = writeln!(out, "[View Paper]({})\n", paper.url());
      let _ = writeln!(out, "---\n");
    }

    if self.papers.len() > TOP_PAPER_COUNT {
      let _ = writeln!(out, "## All Papers\n");
      for (rank, paper) in self.papers.iter().enumerate().skip(TOP_PAPER_COUNT) {
        let score = paper
          .relevance_score
          .map(|score| format!(" ({score}/10)"))
          .unwrap_or_default();
        let _ = writeln!(out, "{}. [{}]({}){score}", rank + 1, paper.title, paper.url());
      }
      let _ = writeln!(out);
    }

    let _ = writeln!(out, "---\n");
    out.push_str("*Generated by tracker*\n");
    out
  }
}

/// Builds ranked reports from stored papers.
///
/// # Examples
///
/// ```no_run
/// # use tracker::{report::ReportBuilder, store::Store};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Store::open("papers.db").await?;
/// let report = ReportBuilder::new(store)
///   .build("2024-01-15".parse()?, "2024-01-15".parse()?)
///   .await?;
/// println!("{}", report.to_markdown());
/// # Ok(())
/// # }
/// ```
pub struct ReportBuilder {
  /// Source of qualifying papers.
  store: Store,
}

impl ReportBuilder {
  /// Creates a builder over the given store.
  pub fn new(store: Store) -> Self { Self { store } }

  /// Builds a ranked report over papers published within the inclusive
  /// date range.
  pub async fn build(&self, start: NaiveDate, end: NaiveDate) -> Result<Report> {
    let mut papers = self.store.query_by_date_range(start, end).await?;
    rank(&mut papers);

    let stats = compute_stats(&papers);
    debug!(
      "Built report for {start} to {end}: {} papers, average score {:.1}",
      stats.total, stats.average_score
    );
    Ok(Report { start, end, papers, stats })
  }
}

/// Sorts papers into report order: score descending, then published
/// date descending, then identifier ascending.
fn rank(papers: &mut [Paper]) {
  papers.sort_by(|a, b| {
    let a_score = a.relevance_score.unwrap_or(0.0);
    let b_score = b.relevance_score.unwrap_or(0.0);
    b_score
      .total_cmp(&a_score)
      .then_with(|| b.published.cmp(&a.published))
      .then_with(|| a.id.cmp(&b.id))
  });
}

/// Computes aggregate statistics over ranked papers.
fn compute_stats(papers: &[Paper]) -> ReportStats {
  let scores: Vec<f64> = papers.iter().filter_map(|p| p.relevance_score).collect();
  let average_score =
    if scores.is_empty() { 0.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 };

  ReportStats {
    total: papers.len(),
    summarized: papers.iter().filter(|p| p.summary.is_some()).count(),
    average_score,
  }
}
