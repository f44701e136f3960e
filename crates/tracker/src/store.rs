//! Durable SQLite storage for the paper lifecycle.
//!
//! The [`Store`] is the single source of truth for every paper the
//! pipeline has ever seen and the only component permitted to mutate
//! lifecycle state. Its contract is built around three guarantees:
//!
//! - **Idempotent upsert**: re-fetching a known identifier never
//!   duplicates a row and never regresses its stage.
//! - **Compare-and-set advancement**: [`Store::advance`] moves the stage
//!   forward only if the record is still at the expected stage; the
//!   loser of a race observes [`TrackerError::StaleStage`].
//! - **Durability**: every write is committed before the call returns; a
//!   crash after a successful `advance` never loses the transition.
//!
//! The schema is initialized from `migrations/init.sql` when the
//! database is opened.
//!
//! # Examples
//!
//! ```no_run
//! # use tracker::{paper::Stage, store::{StageFields, Store}};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open("papers.db").await?;
//! let pending = store.get_pending(Stage::Fetched).await?;
//! for paper in pending {
//!   store
//!     .advance(&paper.id, Stage::Fetched, Stage::Filtered, StageFields::Scored {
//!       relevance_score: 7.5,
//!       matched_terms:   vec!["agents".into()],
//!     })
//!     .await?;
//! }
//! # Ok(())
//! # }
//! ```

use rusqlite::params;
use tokio_rusqlite::Connection;

use crate::{
  paper::{Paper, Stage},
  pipeline::RunSummary,
};

use super::*;

/// Field payload written alongside a stage advancement.
///
/// Using an enum keyed to the target stage keeps later-stage fields from
/// being written before their prerequisite stage is reached: a summary
/// can only be written by a transition into [`Stage::Summarized`].
#[derive(Debug, Clone)]
pub enum StageFields {
  /// No field changes; used for the transition into [`Stage::Reported`].
  None,
  /// Relevance score and matched terms, written by the filter on the
  /// transitions into [`Stage::Filtered`] or [`Stage::Skipped`].
  Scored {
    /// Relevance score on the 0-10 scale.
    relevance_score: f64,
    /// Keywords that matched during scoring.
    matched_terms:   Vec<String>,
  },
  /// Generated summary content, written on the transition into
  /// [`Stage::Summarized`].
  Summarized {
    /// Summary text.
    summary:    String,
    /// Ordered key points.
    key_points: Vec<String>,
  },
}

impl StageFields {
  /// Whether this payload is permitted for a transition into `to`.
  fn permitted_for(&self, to: Stage) -> bool {
    match self {
      StageFields::None => to == Stage::Reported,
      StageFields::Scored { .. } => matches!(to, Stage::Filtered | Stage::Skipped),
      StageFields::Summarized { .. } => to == Stage::Summarized,
    }
  }
}

/// Outcome of the conditional stage update inside the connection closure.
enum AdvanceOutcome {
  Advanced,
  Missing,
  Stale(String),
}

/// Handle for the paper database.
///
/// Cheap to clone; clones share one serialized connection, so concurrent
/// `advance`/`mark_failed` calls are atomic with respect to each other.
#[derive(Clone)]
pub struct Store {
  /// Async SQLite connection handle.
  conn:         Connection,
  /// Failed attempts permitted per paper per stage before the record is
  /// marked permanently failed.
  retry_budget: u32,
}

impl Store {
  /// Opens an existing database or creates a new one at the given path,
  /// initializing the schema from the bundled migration.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path.as_ref()).await?;

    conn
      .call(|conn| {
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;

    Ok(Self { conn, retry_budget: 3 })
  }

  /// Returns the default path for the database file, rooted in the
  /// platform data directory.
  pub fn default_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("tracker").join("tracker.db")
  }

  /// Sets the per-stage retry budget consumed by [`Store::mark_failed`].
  pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
    self.retry_budget = retry_budget.max(1);
    self
  }

  /// Inserts freshly fetched papers, or updates the mutable metadata of
  /// known ones when the incoming version is strictly newer.
  ///
  /// The stage of an existing record is never touched, and derived
  /// fields (score, summary) survive a metadata update. Returns the
  /// identifiers that were newly inserted or updated so downstream
  /// stages know what changed.
  pub async fn upsert_fetched(&self, papers: Vec<Paper>) -> Result<Vec<String>> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut changed = Vec::new();

        {
          let mut known = tx.prepare_cached("SELECT version FROM papers WHERE id = ?1")?;
          let mut insert = tx.prepare_cached(
            "INSERT INTO papers (
                id, title, authors, abstract_text, category,
                published, version, stage, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          )?;
          let mut update = tx.prepare_cached(
            "UPDATE papers
             SET title = ?2, authors = ?3, abstract_text = ?4, category = ?5,
                 published = ?6, version = ?7, updated_at = ?8
             WHERE id = ?1",
          )?;

          for paper in papers {
            let authors = to_json_text(&paper.authors)?;
            let now = Utc::now();
            let existing: Option<u32> =
              match known.query_row(params![paper.id], |row| row.get(0)) {
                Ok(version) => Some(version),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
              };

            match existing {
              None => {
                insert.execute(params![
                  paper.id,
                  paper.title,
                  authors,
                  paper.abstract_text,
                  paper.category,
                  paper.published,
                  paper.version,
                  Stage::Fetched.to_string(),
                  now,
                ])?;
                changed.push(paper.id);
              },
              Some(version) if paper.version > version => {
                update.execute(params![
                  paper.id,
                  paper.title,
                  authors,
                  paper.abstract_text,
                  paper.category,
                  paper.published,
                  paper.version,
                  now,
                ])?;
                changed.push(paper.id);
              },
              Some(_) => {},
            }
          }
        }

        tx.commit()?;
        Ok(changed)
      })
      .await
      .map_err(TrackerError::from)
  }

  /// Returns the papers currently at `stage`, ordered by published date
  /// ascending with ties broken by identifier, so processing is
  /// deterministic and resumable.
  pub async fn get_pending(&self, stage: Stage) -> Result<Vec<Paper>> {
    let stage = stage.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&format!(
          "SELECT {PAPER_COLUMNS} FROM papers
           WHERE stage = ?1
           ORDER BY published ASC, id ASC"
        ))?;
        let papers =
          stmt.query_map([stage], row_to_paper)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(papers)
      })
      .await
      .map_err(TrackerError::from)
  }

  /// Retrieves a single paper by identifier.
  pub async fn get_paper(&self, id: &str) -> Result<Option<Paper>> {
    let id = id.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare_cached(&format!("SELECT {PAPER_COLUMNS} FROM papers WHERE id = ?1"))?;
        match stmt.query_row([id], row_to_paper) {
          Ok(paper) => Ok(Some(paper)),
          Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
          Err(e) => Err(e.into()),
        }
      })
      .await
      .map_err(TrackerError::from)
  }

  /// Atomically writes `fields` and moves the stage from `from` to `to`.
  ///
  /// The update is conditional on the record still being at `from`; a
  /// mismatch yields [`TrackerError::StaleStage`] and modifies nothing.
  /// Transitions the lifecycle ordering forbids are rejected with
  /// [`TrackerError::InvalidTransition`] before touching the database.
  pub async fn advance(&self, id: &str, from: Stage, to: Stage, fields: StageFields) -> Result<()> {
    if !from.can_advance_to(to) || !fields.permitted_for(to) {
      return Err(TrackerError::InvalidTransition { from, to });
    }

    let id_owned = id.to_string();
    let outcome = self
      .conn
      .call(move |conn| {
        let now = Utc::now();
        let updated = match fields {
          StageFields::None => conn.execute(
            "UPDATE papers SET stage = ?3, updated_at = ?4 WHERE id = ?1 AND stage = ?2",
            params![id_owned, from.to_string(), to.to_string(), now],
          )?,
          StageFields::Scored { relevance_score, matched_terms } => conn.execute(
            "UPDATE papers
             SET stage = ?3, updated_at = ?4, relevance_score = ?5, matched_terms = ?6
             WHERE id = ?1 AND stage = ?2",
            params![
              id_owned,
              from.to_string(),
              to.to_string(),
              now,
              relevance_score,
              to_json_text(&matched_terms)?,
            ],
          )?,
          StageFields::Summarized { summary, key_points } => conn.execute(
            "UPDATE papers
             SET stage = ?3, updated_at = ?4, summary = ?5, key_points = ?6
             WHERE id = ?1 AND stage = ?2",
            params![
              id_owned,
              from.to_string(),
              to.to_string(),
              now,
              summary,
              to_json_text(&key_points)?,
            ],
          )?,
        };

        if updated > 0 {
          return Ok(AdvanceOutcome::Advanced);
        }

        let mut stmt = conn.prepare_cached("SELECT stage FROM papers WHERE id = ?1")?;
        match stmt.query_row([&id_owned], |row| row.get::<_, String>(0)) {
          Ok(actual) => Ok(AdvanceOutcome::Stale(actual)),
          Err(rusqlite::Error::QueryReturnedNoRows) => Ok(AdvanceOutcome::Missing),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    match outcome {
      AdvanceOutcome::Advanced => {
        trace!("Advanced {id} from {from} to {to}");
        Ok(())
      },
      AdvanceOutcome::Missing => Err(TrackerError::NotFound(id.to_string())),
      AdvanceOutcome::Stale(actual) => Err(TrackerError::StaleStage {
        id: id.to_string(),
        expected: from,
        actual: Stage::from_str(&actual)?,
      }),
    }
  }

  /// Records a failed attempt for a paper at a stage.
  ///
  /// Increments the per-stage failure counter; once the counter reaches
  /// the retry budget the paper's stage is set to [`Stage::Failed`]
  /// permanently, otherwise the stage is left unchanged so a future run
  /// retries it. The terminal update is conditional on the paper still
  /// sitting at the stage pending `stage`, so a paper that advanced
  /// through an overlapping run is never regressed. Returns `true` when
  /// this call exhausted the budget and marked the paper failed.
  pub async fn mark_failed(&self, id: &str, stage: Stage, reason: &str) -> Result<bool> {
    let id_owned = id.to_string();
    let stage_owned = stage.to_string();
    let pending_stage = stage.predecessor().map(|s| s.to_string());
    let reason_owned = reason.to_string();
    let budget = self.retry_budget;

    let exhausted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        tx.execute(
          "INSERT INTO failures (paper_id, stage, count, last_reason)
           VALUES (?1, ?2, 1, ?3)
           ON CONFLICT (paper_id, stage)
           DO UPDATE SET count = count + 1, last_reason = ?3",
          params![id_owned, stage_owned, reason_owned],
        )?;

        let count: u32 = tx.query_row(
          "SELECT count FROM failures WHERE paper_id = ?1 AND stage = ?2",
          params![id_owned, stage_owned],
          |row| row.get(0),
        )?;

        let exhausted = match (&pending_stage, count >= budget) {
          (Some(pending), true) => {
            let changed = tx.execute(
              "UPDATE papers SET stage = ?3, updated_at = ?4 WHERE id = ?1 AND stage = ?2",
              params![id_owned, pending, Stage::Failed.to_string(), Utc::now()],
            )?;
            changed == 1
          },
          _ => false,
        };

        tx.commit()?;
        Ok(exhausted)
      })
      .await?;

    if exhausted {
      warn!("Retry budget exhausted for {id} at stage {stage}: {reason}");
    } else {
      debug!("Recorded failure for {id} at stage {stage}: {reason}");
    }
    Ok(exhausted)
  }

  /// Returns the recorded failure count for a paper at a stage.
  pub async fn failure_count(&self, id: &str, stage: Stage) -> Result<u32> {
    let id = id.to_string();
    let stage = stage.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn
          .prepare_cached("SELECT count FROM failures WHERE paper_id = ?1 AND stage = ?2")?;
        match stmt.query_row(params![id, stage], |row| row.get(0)) {
          Ok(count) => Ok(count),
          Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
          Err(e) => Err(e.into()),
        }
      })
      .await
      .map_err(TrackerError::from)
  }

  /// Returns all summarized or reported papers published within the
  /// inclusive date range, for report rendering.
  pub async fn query_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Paper>> {
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&format!(
          "SELECT {PAPER_COLUMNS} FROM papers
           WHERE stage IN (?1, ?2) AND published >= ?3 AND published <= ?4
           ORDER BY published ASC, id ASC"
        ))?;
        let papers = stmt
          .query_map(
            params![Stage::Summarized.to_string(), Stage::Reported.to_string(), start, end],
            row_to_paper,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(papers)
      })
      .await
      .map_err(TrackerError::from)
  }

  /// Persists a run summary record for this invocation.
  pub async fn record_run(&self, summary: &RunSummary) -> Result<i64> {
    let started_at = summary.started_at;
    let payload = serde_json::to_string(summary)?;
    self
      .conn
      .call(move |conn| {
        let id = conn.query_row(
          "INSERT INTO runs (started_at, summary) VALUES (?1, ?2) RETURNING id",
          params![started_at, payload],
          |row| row.get(0),
        )?;
        Ok(id)
      })
      .await
      .map_err(TrackerError::from)
  }
}

/// Column list shared by every paper SELECT, in [`row_to_paper`] order.
const PAPER_COLUMNS: &str = "id, title, authors, abstract_text, category, published, version, \
                             relevance_score, matched_terms, summary, key_points, stage, \
                             updated_at";

/// Converts a database row into a [`Paper`], decoding the JSON-text
/// columns.
fn row_to_paper(row: &rusqlite::Row) -> rusqlite::Result<Paper> {
  Ok(Paper {
    id:              row.get(0)?,
    title:           row.get(1)?,
    authors:         from_json_text(2, row.get::<_, String>(2)?)?,
    abstract_text:   row.get(3)?,
    category:        row.get(4)?,
    published:       row.get(5)?,
    version:         row.get(6)?,
    relevance_score: row.get(7)?,
    matched_terms:   row
      .get::<_, Option<String>>(8)?
      .map(|text| from_json_text(8, text))
      .transpose()?,
    summary:         row.get(9)?,
    key_points:      row
      .get::<_, Option<String>>(10)?
      .map(|text| from_json_text(10, text))
      .transpose()?,
    stage:           Stage::from_str(&row.get::<_, String>(11)?).map_err(|e| {
      rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
    })?,
    updated_at:      row.get(12)?,
  })
}

/// Encodes a string list as JSON text for storage.
fn to_json_text(values: &[String]) -> core::result::Result<String, tokio_rusqlite::Error> {
  serde_json::to_string(values).map_err(|e| {
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
  })
}

/// Decodes a JSON-text column back into a string list.
fn from_json_text(index: usize, text: String) -> rusqlite::Result<Vec<String>> {
  serde_json::from_str(&text).map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
  })
}
