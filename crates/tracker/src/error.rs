//! Error types for the tracker library.
//!
//! The error taxonomy follows the pipeline's failure-handling design:
//!
//! - *Transient* upstream errors (timeouts, 5xx, rate limits) are
//!   retried with bounded backoff, see [`crate::retry`].
//! - *Permanent* upstream errors (malformed payloads, other 4xx,
//!   validation failures on generated content) are not retried within a
//!   run; they count against a per-paper budget tracked in the store.
//! - [`TrackerError::StaleStage`] is an expected outcome of concurrent
//!   stage advancement and is treated as already-handled, not a failure.
//! - Store errors are fatal to a run since no further progress can be
//!   durably recorded.

use thiserror::Error;

use crate::paper::Stage;

/// Error type alias used for the [`tracker`](crate) crate.
pub type Result<T> = core::result::Result<T, TrackerError>;

/// Errors that can occur while tracking, storing, and summarizing papers.
#[derive(Error, Debug)]
pub enum TrackerError {
  /// The provided paper identifier doesn't match the arXiv format.
  #[error("Invalid identifier format")]
  InvalidIdentifier,

  /// A stored stage string didn't match any known [`Stage`] variant.
  #[error("Invalid lifecycle stage: {0}")]
  InvalidStage(String),

  /// No stored paper exists for the given identifier.
  #[error("Paper not found: {0}")]
  NotFound(String),

  /// A compare-and-set stage advancement lost the race: the record's
  /// current stage did not match the expected one. Expected under
  /// concurrent access and treated as a no-op by callers.
  #[error("Stale stage for {id}: expected {expected}, found {actual}")]
  StaleStage {
    /// Identifier of the contested paper.
    id:       String,
    /// Stage the caller expected the record to be at.
    expected: Stage,
    /// Stage the record was actually at.
    actual:   Stage,
  },

  /// An advancement was requested that the lifecycle ordering forbids.
  #[error("Cannot advance from {from} to {to}")]
  InvalidTransition {
    /// Stage the transition started from.
    from: Stage,
    /// Stage the transition was aimed at.
    to:   Stage,
  },

  /// An upstream service answered with a non-success HTTP status.
  ///
  /// Rate limits (429) and server errors (5xx) are transient; every
  /// other status is permanent for the current run.
  #[error("Upstream returned HTTP status {0}")]
  UpstreamStatus(u16),

  /// An upstream response failed validation at the boundary.
  ///
  /// Covers malformed feed XML as well as generated summaries that do
  /// not match the expected shape. Never retried with backoff.
  #[error("Invalid upstream response: {0}")]
  InvalidResponse(String),

  /// A network request failed.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// A SQLite operation failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// JSON serialization of a stored field failed.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// Deserializing a TOML configuration failed.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// Serializing a TOML configuration failed.
  #[error(transparent)]
  TomlSer(#[from] toml::ser::Error),

  /// A configuration value was missing or inconsistent.
  #[error("{0}")]
  Config(String),
}

impl TrackerError {
  /// Whether this error is worth retrying with backoff.
  ///
  /// Timeouts, connection failures, rate limits, and server errors are
  /// transient; everything else either cannot succeed on retry or must
  /// abort the run.
  pub fn is_transient(&self) -> bool {
    match self {
      TrackerError::Network(e) => e.is_timeout() || e.is_connect(),
      TrackerError::UpstreamStatus(status) => *status == 429 || *status >= 500,
      _ => false,
    }
  }

  /// Whether this error must abort the current run.
  ///
  /// Store and filesystem failures mean no further progress can be
  /// durably recorded, so the orchestrator stops immediately.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      TrackerError::Sqlite(_) | TrackerError::AsyncSqlite(_) | TrackerError::Io(_)
    )
  }
}
