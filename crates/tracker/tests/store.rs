use chrono::NaiveDate;
use tempfile::tempdir;
use tracker::{
  paper::{Paper, Stage},
  pipeline::RunSummary,
  prelude::*,
  store::{StageFields, Store},
};

fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2023, 1, d).unwrap() }

fn sample(id: &str, published: NaiveDate) -> Paper {
  Paper::fetched(
    id.to_string(),
    format!("Paper {id}"),
    vec!["Test Author".to_string()],
    "An abstract about agents.".to_string(),
    "cs.AI".to_string(),
    published,
    1,
  )
}

async fn open_store(dir: &tempfile::TempDir) -> Store {
  Store::open(dir.path().join("tracker.db")).await.unwrap()
}

async fn advance_to_filtered(store: &Store, id: &str) {
  store
    .advance(id, Stage::Fetched, Stage::Filtered, StageFields::Scored {
      relevance_score: 8.0,
      matched_terms:   vec!["agents".to_string()],
    })
    .await
    .unwrap();
}

async fn advance_to_summarized(store: &Store, id: &str) {
  advance_to_filtered(store, id).await;
  store
    .advance(id, Stage::Filtered, Stage::Summarized, StageFields::Summarized {
      summary:    "A summary.".to_string(),
      key_points: vec!["A key point.".to_string()],
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await;
  let papers = vec![sample("2301.00001", day(10)), sample("2301.00002", day(11))];

  let changed = store.upsert_fetched(papers.clone()).await.unwrap();
  assert_eq!(changed.len(), 2);

  // The same batch again changes nothing and duplicates nothing.
  let changed = store.upsert_fetched(papers).await.unwrap();
  assert!(changed.is_empty());
  assert_eq!(store.get_pending(Stage::Fetched).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_refetch_never_regresses_stage() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await;
  store.upsert_fetched(vec![sample("2301.00001", day(10))]).await.unwrap();
  advance_to_filtered(&store, "2301.00001").await;

  store.upsert_fetched(vec![sample("2301.00001", day(10))]).await.unwrap();

  let paper = store.get_paper("2301.00001").await.unwrap().unwrap();
  assert_eq!(paper.stage, Stage::Filtered);
}

#[tokio::test]
async fn test_newer_version_updates_metadata_only() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await;
  store.upsert_fetched(vec![sample("2301.00001", day(10))]).await.unwrap();
  advance_to_filtered(&store, "2301.00001").await;

  let mut revised = sample("2301.00001", day(10));
  revised.version = 2;
  revised.title = "Paper 2301.00001 (revised)".to_string();
  let changed = store.upsert_fetched(vec![revised]).await.unwrap();
  assert_eq!(changed, vec!["2301.00001".to_string()]);

  let paper = store.get_paper("2301.00001").await.unwrap().unwrap();
  assert_eq!(paper.title, "Paper 2301.00001 (revised)");
  assert_eq!(paper.version, 2);
  // Lifecycle state and derived fields survive the metadata update.
  assert_eq!(paper.stage, Stage::Filtered);
  assert_eq!(paper.relevance_score, Some(8.0));

  // An older version changes nothing.
  let changed = store.upsert_fetched(vec![sample("2301.00001", day(10))]).await.unwrap();
  assert!(changed.is_empty());
  assert_eq!(store.get_paper("2301.00001").await.unwrap().unwrap().version, 2);
}

#[tokio::test]
async fn test_concurrent_advance_succeeds_at_most_once() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await;
  store.upsert_fetched(vec![sample("2301.00001", day(10))]).await.unwrap();

  let fields = || StageFields::Scored { relevance_score: 8.0, matched_terms: Vec::new() };
  let a = {
    let store = store.clone();
    tokio::spawn(async move {
      store.advance("2301.00001", Stage::Fetched, Stage::Filtered, fields()).await
    })
  };
  let b = {
    let store = store.clone();
    tokio::spawn(async move {
      store.advance("2301.00001", Stage::Fetched, Stage::Skipped, fields()).await
    })
  };

  let (a, b) = (a.await.unwrap(), b.await.unwrap());
  let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
  assert_eq!(successes, 1);
  let loser = if a.is_ok() { b } else { a };
  assert!(matches!(loser, Err(TrackerError::StaleStage { .. })));
}

#[tokio::test]
async fn test_stale_advance_modifies_nothing() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await;
  store.upsert_fetched(vec![sample("2301.00001", day(10))]).await.unwrap();
  advance_to_filtered(&store, "2301.00001").await;

  let result = store
    .advance("2301.00001", Stage::Fetched, Stage::Filtered, StageFields::Scored {
      relevance_score: 1.0,
      matched_terms:   Vec::new(),
    })
    .await;
  assert!(matches!(result, Err(TrackerError::StaleStage { .. })));

  let paper = store.get_paper("2301.00001").await.unwrap().unwrap();
  assert_eq!(paper.relevance_score, Some(8.0));
  assert_eq!(paper.stage, Stage::Filtered);
}

#[tokio::test]
async fn test_skipping_a_stage_is_rejected() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await;
  store.upsert_fetched(vec![sample("2301.00001", day(10))]).await.unwrap();

  let result = store
    .advance("2301.00001", Stage::Fetched, Stage::Summarized, StageFields::Summarized {
      summary:    "Too early.".to_string(),
      key_points: vec!["Nope.".to_string()],
    })
    .await;
  assert!(matches!(result, Err(TrackerError::InvalidTransition { .. })));

  // The field payload must match the target stage too.
  let result =
    store.advance("2301.00001", Stage::Fetched, Stage::Filtered, StageFields::None).await;
  assert!(matches!(result, Err(TrackerError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_advance_unknown_paper_is_not_found() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await;

  let result =
    store.advance("2301.99999", Stage::Summarized, Stage::Reported, StageFields::None).await;
  assert!(matches!(result, Err(TrackerError::NotFound(_))));
}

#[tokio::test]
async fn test_retry_budget_exhausts_exactly_at_budget() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await.with_retry_budget(3);
  store.upsert_fetched(vec![sample("2301.00001", day(10))]).await.unwrap();
  advance_to_filtered(&store, "2301.00001").await;

  for attempt in 1..=2 {
    let exhausted =
      store.mark_failed("2301.00001", Stage::Summarized, "llm unreachable").await.unwrap();
    assert!(!exhausted, "budget exhausted after {attempt} failures");
    let paper = store.get_paper("2301.00001").await.unwrap().unwrap();
    assert_eq!(paper.stage, Stage::Filtered);
  }

  let exhausted =
    store.mark_failed("2301.00001", Stage::Summarized, "llm unreachable").await.unwrap();
  assert!(exhausted);
  let paper = store.get_paper("2301.00001").await.unwrap().unwrap();
  assert_eq!(paper.stage, Stage::Failed);
  assert_eq!(store.failure_count("2301.00001", Stage::Summarized).await.unwrap(), 3);
}

#[tokio::test]
async fn test_exhausted_budget_never_regresses_an_advanced_paper() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await.with_retry_budget(3);
  store.upsert_fetched(vec![sample("2301.00001", day(10))]).await.unwrap();
  advance_to_summarized(&store, "2301.00001").await;
  store
    .advance("2301.00001", Stage::Summarized, Stage::Reported, StageFields::None)
    .await
    .unwrap();

  // Failure records from a stale overlapping run exhaust the counter but
  // must leave the reported paper untouched.
  for _ in 0..3 {
    let exhausted =
      store.mark_failed("2301.00001", Stage::Summarized, "llm unreachable").await.unwrap();
    assert!(!exhausted);
  }

  let paper = store.get_paper("2301.00001").await.unwrap().unwrap();
  assert_eq!(paper.stage, Stage::Reported);
  assert_eq!(store.failure_count("2301.00001", Stage::Summarized).await.unwrap(), 3);
}

#[tokio::test]
async fn test_date_range_returns_summarized_in_order() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await;
  store
    .upsert_fetched(vec![
      sample("2301.00002", day(11)),
      sample("2301.00001", day(10)),
      sample("2301.00003", day(12)),
      sample("2301.00004", day(10)),
    ])
    .await
    .unwrap();
  for id in ["2301.00001", "2301.00002", "2301.00003"] {
    advance_to_summarized(&store, id).await;
  }
  // 2301.00004 stays fetched and must not appear.

  let papers = store.query_by_date_range(day(10), day(11)).await.unwrap();
  let ids: Vec<&str> = papers.iter().map(|p| p.id.as_str()).collect();
  assert_eq!(ids, vec!["2301.00001", "2301.00002"]);
}

#[tokio::test]
async fn test_run_summary_is_recorded() {
  let dir = tempdir().unwrap();
  let store = open_store(&dir).await;

  let first = store.record_run(&RunSummary::new()).await.unwrap();
  let second = store.record_run(&RunSummary::new()).await.unwrap();
  assert!(second > first);
}
