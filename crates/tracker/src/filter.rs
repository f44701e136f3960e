//! Deterministic keyword relevance scoring.
//!
//! Scoring is a pure function of the paper's title and abstract against
//! the configured keyword list, so re-running the filter over the same
//! inputs always produces the same scores. The filter never talks to
//! the network and never mutates state; the pipeline applies the
//! threshold and records the outcome through the store.

use crate::paper::Paper;

use super::*;

/// Relevance scoring over a fixed keyword list.
///
/// Scores land on a 0 to 10 scale: the fraction of keywords appearing
/// in the title or abstract is worth up to 8 points, and any keyword
/// appearing in the title itself adds a 2 point bonus, since a title
/// match is a far stronger relevance signal than one buried in the
/// abstract.
///
/// # Examples
///
/// ```
/// # use tracker::filter::KeywordPolicy;
/// let policy = KeywordPolicy::new(vec!["transformer".into(), "attention".into()], 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
  /// Keywords matched case-insensitively, stored lowercased.
  keywords:  Vec<String>,
  /// Minimum score required to advance past the filter.
  threshold: f64,
}

impl KeywordPolicy {
  /// Creates a policy from a keyword list and a score threshold.
  pub fn new(keywords: Vec<String>, threshold: f64) -> Self {
    let keywords = keywords
      .into_iter()
      .map(|k| k.trim().to_lowercase())
      .filter(|k| !k.is_empty())
      .collect();
    Self { keywords, threshold }
  }

  /// The minimum score required to pass the filter.
  pub fn threshold(&self) -> f64 { self.threshold }

  /// Whether a score passes the configured threshold.
  pub fn passes(&self, score: f64) -> bool { score >= self.threshold }

  /// Scores a paper, returning the score and the keywords that matched.
  ///
  /// An empty keyword list scores every paper at a neutral 5.0 with no
  /// matched terms, so an unconfigured filter passes everything through
  /// under the default threshold rather than skipping the whole feed.
  pub fn score(&self, paper: &Paper) -> (f64, Vec<String>) {
    if self.keywords.is_empty() {
      return (5.0, Vec::new());
    }

    let title = paper.title.to_lowercase();
    let abstract_text = paper.abstract_text.to_lowercase();

    let mut matched = Vec::new();
    let mut title_hits = 0_usize;
    for keyword in &self.keywords {
      let in_title = title.contains(keyword.as_str());
      if in_title {
        title_hits += 1;
      }
      if in_title || abstract_text.contains(keyword.as_str()) {
        matched.push(keyword.clone());
      }
    }

    let coverage = matched.len() as f64 / self.keywords.len() as f64;
    let title_bonus = if title_hits > 0 { 2.0 } else { 0.0 };
    let score = ((coverage * 8.0 + title_bonus) * 1000.0).round() / 1000.0;

    trace!("Scored {} at {score} ({} matched terms)", paper.id, matched.len());
    (score, matched)
  }
}
