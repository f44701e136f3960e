//! Error types for the tracker CLI.

use thiserror::Error;
use tracker::prelude::TrackerError;

/// Error type alias used for the `trackerd` crate.
pub type Result<T> = core::result::Result<T, TrackerdError>;

/// Errors surfaced by CLI commands.
#[derive(Error, Debug)]
pub enum TrackerdError {
  /// An error bubbled up from the tracker library.
  #[error(transparent)]
  Tracker(#[from] TrackerError),

  /// A file system operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// Serializing a run summary failed.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// A run permanently failed one or more papers; used to drive a
  /// non-zero exit code for cron invocations.
  #[error("{0} paper(s) permanently failed this run")]
  FailedPapers(usize),
}
