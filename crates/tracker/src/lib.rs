//! Paper lifecycle pipeline for arXiv tracking and summarization.
//!
//! `tracker` moves academic papers through a forward-only lifecycle:
//! fetch from the arXiv export API, de-duplicate into a local SQLite
//! store, score for relevance, summarize with a local LLM, and render a
//! daily digest. Progress is persisted per paper so a failed or partial
//! run resumes without redoing or duplicating work.
//!
//! # Module Organization
//!
//! - [`paper`]: Core paper record and the [`paper::Stage`] lifecycle enum
//! - [`store`]: Durable SQLite store with compare-and-set stage advancement
//! - [`fetch`]: arXiv export API pagination and Atom feed validation
//! - [`filter`]: Pure keyword relevance scoring
//! - [`summarize`]: LLM summarization with bounded concurrency
//! - [`report`]: Deterministic markdown digest rendering
//! - [`pipeline`]: Orchestration of the stages into a single run
//! - [`retry`]: Bounded exponential backoff shared by the network stages
//! - [`config`]: TOML application configuration
//! - [`datetime`]: Clock-skew tolerant "today"
//!
//! # Getting Started
//!
//! ```no_run
//! use tracker::{
//!   config::{Config, DateWindow},
//!   pipeline::Pipeline,
//!   store::Store,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = Config::default();
//!   let store = Store::open(&config.database_path).await?;
//!   let window = DateWindow::single_day(tracker::datetime::current_date().await);
//!   let pipeline = Pipeline::from_config(&config, store, window)?;
//!
//!   let (summary, report) = pipeline.run().await?;
//!   println!("fetched {}, summarized {}", summary.fetched, summary.summarized);
//!   println!("{}", report.to_markdown());
//!   Ok(())
//! }
//! ```
//!
//! # Design Notes
//!
//! The store is the single source of truth: every component computes
//! values and hands them to [`store::Store::advance`] for an atomic,
//! durable write guarded by the paper's current stage. Two concurrent
//! attempts to advance the same paper cannot both succeed; the loser
//! observes [`error::TrackerError::StaleStage`] and treats the work as
//! already handled.

#![warn(missing_docs)]

use std::{
  fmt::Display,
  path::{Path, PathBuf},
  str::FromStr,
};

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

pub mod config;
pub mod datetime;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod paper;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod store;
pub mod summarize;

use crate::error::*;

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use tracker::prelude::*;
/// ```
pub mod prelude {
  pub use crate::{
    error::{Result, TrackerError},
    fetch::PaperSource,
    summarize::Generate,
  };
}
