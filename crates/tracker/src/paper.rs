//! Core paper record and lifecycle stage handling.
//!
//! This module provides the central [`Paper`] entity and the forward-only
//! [`Stage`] enum that orders its lifecycle. A paper is uniquely
//! identified by its base arXiv identifier with the version suffix
//! stripped; two versions of the same logical paper share one record,
//! with the newest version's metadata winning.
//!
//! # Examples
//!
//! ```
//! use tracker::paper::{parse_identifier, Stage};
//!
//! let (id, version) = parse_identifier("2301.07041v2").unwrap();
//! assert_eq!(id, "2301.07041");
//! assert_eq!(version, 2);
//!
//! assert_eq!(Stage::Fetched.successor(), Some(Stage::Filtered));
//! assert!(Stage::Fetched.can_advance_to(Stage::Skipped));
//! assert!(!Stage::Filtered.can_advance_to(Stage::Reported));
//! ```

use super::*;

/// A single tracked publication record with its lifecycle stage and
/// derived fields.
///
/// The store exclusively owns persisted instances; other components
/// compute values (score, summary) and hand them to the store for an
/// atomic write via [`crate::store::Store::advance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
  /// Base arXiv identifier, version suffix stripped (e.g. "2301.07041").
  pub id:              String,
  /// The paper's full title, whitespace-normalized.
  pub title:           String,
  /// Ordered list of author names.
  pub authors:         Vec<String>,
  /// Full abstract text, whitespace-normalized.
  pub abstract_text:   String,
  /// Primary arXiv category (e.g. "cs.AI").
  pub category:        String,
  /// Publication date as reported by the feed.
  pub published:       NaiveDate,
  /// Submission version this record last saw.
  pub version:         u32,
  /// Relevance score on a 0-10 scale, assigned by the filter.
  pub relevance_score: Option<f64>,
  /// Keywords that matched during filtering.
  pub matched_terms:   Option<Vec<String>>,
  /// Generated summary text, assigned by the summarizer.
  pub summary:         Option<String>,
  /// Generated key points, assigned by the summarizer.
  pub key_points:      Option<Vec<String>>,
  /// Current lifecycle stage.
  pub stage:           Stage,
  /// Timestamp of the last store write for this record.
  pub updated_at:      DateTime<Utc>,
}

impl Paper {
  /// Constructs a freshly fetched paper at [`Stage::Fetched`] with no
  /// derived fields.
  pub fn fetched(
    id: String,
    title: String,
    authors: Vec<String>,
    abstract_text: String,
    category: String,
    published: NaiveDate,
    version: u32,
  ) -> Self {
    Self {
      id,
      title,
      authors,
      abstract_text,
      category,
      published,
      version,
      relevance_score: None,
      matched_terms: None,
      summary: None,
      key_points: None,
      stage: Stage::Fetched,
      updated_at: Utc::now(),
    }
  }

  /// The canonical abstract-page URL for this paper.
  pub fn url(&self) -> String { format!("https://arxiv.org/abs/{}", self.id) }
}

/// A position in the paper's forward-only processing lifecycle.
///
/// Transitions only move forward in the declared ordering, or from
/// [`Stage::Fetched`] into the terminal [`Stage::Skipped`]. The terminal
/// [`Stage::Failed`] is only ever set by the store once a paper's retry
/// budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  /// Pulled from the catalog, not yet scored.
  Fetched,
  /// Scored above threshold, awaiting summarization.
  Filtered,
  /// Summary and key points written.
  Summarized,
  /// Included in a rendered report.
  Reported,
  /// Scored below threshold; terminal.
  Skipped,
  /// Retry budget exhausted at some stage; terminal.
  Failed,
}

impl Stage {
  /// The next stage in the forward ordering, if any.
  pub fn successor(self) -> Option<Stage> {
    match self {
      Stage::Fetched => Some(Stage::Filtered),
      Stage::Filtered => Some(Stage::Summarized),
      Stage::Summarized => Some(Stage::Reported),
      Stage::Reported | Stage::Skipped | Stage::Failed => None,
    }
  }

  /// The stage a paper occupies while work toward `self` is pending, if
  /// any.
  pub fn predecessor(self) -> Option<Stage> {
    match self {
      Stage::Filtered => Some(Stage::Fetched),
      Stage::Summarized => Some(Stage::Filtered),
      Stage::Reported => Some(Stage::Summarized),
      Stage::Fetched | Stage::Skipped | Stage::Failed => None,
    }
  }

  /// Whether the lifecycle ordering permits advancing from `self` to
  /// `to`. Only the immediate successor is reachable, plus the skip
  /// transition out of [`Stage::Fetched`].
  pub fn can_advance_to(self, to: Stage) -> bool {
    self.successor() == Some(to) || (self == Stage::Fetched && to == Stage::Skipped)
  }

  /// Whether this stage is terminal and immutable going forward.
  pub fn is_terminal(self) -> bool {
    matches!(self, Stage::Skipped | Stage::Failed)
  }
}

impl Display for Stage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Stage::Fetched => write!(f, "fetched"),
      Stage::Filtered => write!(f, "filtered"),
      Stage::Summarized => write!(f, "summarized"),
      Stage::Reported => write!(f, "reported"),
      Stage::Skipped => write!(f, "skipped"),
      Stage::Failed => write!(f, "failed"),
    }
  }
}

impl FromStr for Stage {
  type Err = TrackerError;

  fn from_str(s: &str) -> Result<Self> {
    match &s.to_lowercase() as &str {
      "fetched" => Ok(Stage::Fetched),
      "filtered" => Ok(Stage::Filtered),
      "summarized" => Ok(Stage::Summarized),
      "reported" => Ok(Stage::Reported),
      "skipped" => Ok(Stage::Skipped),
      "failed" => Ok(Stage::Failed),
      s => Err(TrackerError::InvalidStage(s.to_owned())),
    }
  }
}

/// Splits a raw feed identifier into its base id and version.
///
/// Accepts both new-style ("2301.07041v2") and old-style
/// ("math.AG/0601001v1") identifiers; a missing version suffix defaults
/// to 1.
pub fn parse_identifier(raw: &str) -> Result<(String, u32)> {
  lazy_static! {
    static ref ARXIV_ID: Regex =
      Regex::new(r"^(?P<id>\d{4}\.\d{4,5}|[a-zA-Z.-]+/\d{7})(?:v(?P<version>\d+))?$").unwrap();
  }

  let captures = ARXIV_ID.captures(raw).ok_or(TrackerError::InvalidIdentifier)?;
  let id = captures.name("id").ok_or(TrackerError::InvalidIdentifier)?.as_str().to_string();
  let version = captures
    .name("version")
    .map(|m| m.as_str().parse::<u32>())
    .transpose()
    .map_err(|_| TrackerError::InvalidIdentifier)?
    .unwrap_or(1);
  Ok((id, version))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn all_stages() -> [Stage; 6] {
    [Stage::Fetched, Stage::Filtered, Stage::Summarized, Stage::Reported, Stage::Skipped, Stage::Failed]
  }

  #[test]
  fn test_stage_ordering_is_monotonic() {
    assert!(Stage::Fetched < Stage::Filtered);
    assert!(Stage::Filtered < Stage::Summarized);
    assert!(Stage::Summarized < Stage::Reported);
  }

  #[test]
  fn test_stage_transitions() {
    assert!(Stage::Fetched.can_advance_to(Stage::Filtered));
    assert!(Stage::Fetched.can_advance_to(Stage::Skipped));
    assert!(Stage::Filtered.can_advance_to(Stage::Summarized));
    assert!(Stage::Summarized.can_advance_to(Stage::Reported));

    // No skipping ahead, no regressions, no leaving terminal stages.
    assert!(!Stage::Fetched.can_advance_to(Stage::Summarized));
    assert!(!Stage::Filtered.can_advance_to(Stage::Fetched));
    assert!(!Stage::Filtered.can_advance_to(Stage::Skipped));
    for stage in all_stages() {
      assert!(!Stage::Skipped.can_advance_to(stage));
      assert!(!Stage::Failed.can_advance_to(stage));
      assert!(!Stage::Reported.can_advance_to(stage));
    }
  }

  #[test]
  fn test_stage_round_trip() {
    for stage in all_stages() {
      assert_eq!(Stage::from_str(&stage.to_string()).unwrap(), stage);
    }
    assert!(Stage::from_str("pending").is_err());
  }

  #[test]
  fn test_parse_identifier() {
    assert_eq!(parse_identifier("2301.07041").unwrap(), ("2301.07041".to_string(), 1));
    assert_eq!(parse_identifier("2301.07041v3").unwrap(), ("2301.07041".to_string(), 3));
    assert_eq!(parse_identifier("math.AG/0601001v2").unwrap(), ("math.AG/0601001".to_string(), 2));
    assert!(parse_identifier("not-an-id").is_err());
    assert!(parse_identifier("").is_err());
  }
}
