//! Bounded exponential backoff shared by the network-facing stages.
//!
//! Both the fetcher and the summarizer talk to unreliable upstreams.
//! Rather than each carrying its own ad hoc retry loop, they consume a
//! single [`RetryPolicy`] through [`with_retry`], which retries only
//! errors classified transient by [`TrackerError::is_transient`] and
//! gives up after a bounded attempt count.

use std::{future::Future, time::Duration};

use rand::Rng;

use super::*;

/// A bounded retry policy with capped, jittered exponential backoff.
///
/// The delay before attempt `n + 1` doubles per attempt from
/// `base_delay_ms` up to `max_delay_ms`, then half of it is re-drawn
/// uniformly at random so synchronized clients spread out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts permitted per operation, including the first.
  pub max_attempts:  u32,
  /// Delay before the first retry, in milliseconds.
  pub base_delay_ms: u64,
  /// Cap on the backoff delay, in milliseconds.
  pub max_delay_ms:  u64,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 8_000 } }
}

impl RetryPolicy {
  /// The jittered delay to sleep after the given failed attempt
  /// (1-based).
  pub fn delay(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let capped = self
      .base_delay_ms
      .saturating_mul(1_u64 << exponent)
      .min(self.max_delay_ms)
      .max(1);
    let half = capped / 2;
    let jitter = rand::thread_rng().gen_range(0..=half.max(1));
    Duration::from_millis(half + jitter)
  }

  /// A policy that never sleeps, for tests.
  pub fn immediate(max_attempts: u32) -> Self {
    Self { max_attempts, base_delay_ms: 0, max_delay_ms: 0 }
  }
}

/// Runs `operation` under `policy`, retrying transient failures with
/// backoff until success, a permanent error, or attempt exhaustion.
///
/// The final error is returned unchanged so callers can still classify
/// it (e.g. to decide whether to record a paper-level failure).
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let mut attempt = 0;
  loop {
    attempt += 1;
    match operation().await {
      Ok(value) => return Ok(value),
      Err(e) if e.is_transient() && attempt < policy.max_attempts => {
        let delay = policy.delay(attempt);
        warn!("Transient failure (attempt {attempt}/{}), retrying in {delay:?}: {e}", policy.max_attempts);
        tokio::time::sleep(delay).await;
      },
      Err(e) => {
        trace!("Giving up after attempt {attempt}: {e}");
        return Err(e);
      },
    }
  }
}
