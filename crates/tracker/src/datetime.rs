//! Best-effort current-time resolution with clock-skew correction.
//!
//! A machine whose clock has drifted far into the future would silently
//! fetch the wrong date window every run. Before trusting the local
//! clock, these helpers compare it against the `Date` header of a
//! lightweight HEAD request to arXiv; if the local clock is more than 48
//! hours ahead of the server, the server time wins. Any network failure
//! falls back to the local clock.

use std::time::Duration;

use chrono::TimeDelta;

use super::*;

/// Local clock drift tolerated before the server time is preferred.
const MAX_SKEW_HOURS: i64 = 48;

/// HEAD target for the time check; small and always reachable when the
/// feed itself is.
const TIME_CHECK_URL: &str = "https://arxiv.org/";

/// Picks between the local and server clocks.
///
/// The local clock wins unless it runs more than 48 hours ahead of the
/// server, or no server time is available.
fn resolve(local: DateTime<Utc>, server: Option<DateTime<Utc>>) -> DateTime<Utc> {
  match server {
    Some(server) if local - server > TimeDelta::hours(MAX_SKEW_HOURS) => {
      warn!("Local clock is more than {MAX_SKEW_HOURS}h ahead of {TIME_CHECK_URL}, using server time");
      server
    },
    _ => local,
  }
}

/// Fetches the server's notion of the current time from its `Date`
/// response header. Returns `None` on any failure.
async fn server_time() -> Option<DateTime<Utc>> {
  let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build().ok()?;
  let response = client.head(TIME_CHECK_URL).send().await.ok()?;
  let header = response.headers().get(reqwest::header::DATE)?.to_str().ok()?;
  DateTime::parse_from_rfc2822(header).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Returns the current UTC datetime, corrected for local clock skew.
pub async fn current_datetime() -> DateTime<Utc> { resolve(Utc::now(), server_time().await) }

/// Returns today's date, corrected for local clock skew.
pub async fn current_date() -> NaiveDate { current_datetime().await.date_naive() }

#[cfg(test)]
mod tests {
  use super::*;

  fn utc(s: &str) -> DateTime<Utc> { s.parse().unwrap() }

  #[test]
  fn test_local_clock_wins_within_tolerance() {
    let local = utc("2024-01-15T12:00:00Z");
    let server = utc("2024-01-14T12:00:00Z");
    assert_eq!(resolve(local, Some(server)), local);
  }

  #[test]
  fn test_server_clock_wins_when_local_runs_far_ahead() {
    let local = utc("2024-01-18T12:00:01Z");
    let server = utc("2024-01-15T12:00:00Z");
    assert_eq!(resolve(local, Some(server)), server);
  }

  #[test]
  fn test_local_clock_behind_server_is_trusted() {
    // Only a clock running ahead is corrected; a slow clock at worst
    // re-fetches a window idempotently.
    let local = utc("2024-01-10T12:00:00Z");
    let server = utc("2024-01-15T12:00:00Z");
    assert_eq!(resolve(local, Some(server)), local);
  }

  #[test]
  fn test_missing_server_time_falls_back_to_local() {
    let local = utc("2024-01-15T12:00:00Z");
    assert_eq!(resolve(local, None), local);
  }
}
