use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::{tempdir, TempDir};

fn tracker() -> Command { Command::cargo_bin("tracker").unwrap() }

/// Runs `init` against throwaway paths and returns the temp dir and the
/// config file path inside it.
fn init_workspace() -> Result<(TempDir, String)> {
  let dir = tempdir()?;
  let config = dir.path().join("config.toml").display().to_string();
  let db_path = dir.path().join("tracker.db").display().to_string();
  let reports_dir = dir.path().join("reports").display().to_string();

  tracker()
    .args(["--config", &config, "init", "--db-path", &db_path, "--reports-dir", &reports_dir])
    .assert()
    .success()
    .stdout(predicate::str::contains("Initialized tracker"));

  Ok((dir, config))
}

#[test]
fn test_help_lists_subcommands() {
  tracker().arg("--help").assert().success().stdout(
    predicate::str::contains("init")
      .and(predicate::str::contains("fetch"))
      .and(predicate::str::contains("summarize"))
      .and(predicate::str::contains("report"))
      .and(predicate::str::contains("run")),
  );
}

#[test]
#[serial]
fn test_init_creates_database_and_config() -> Result<()> {
  let (dir, config) = init_workspace()?;

  assert!(dir.path().join("tracker.db").exists());
  assert!(dir.path().join("reports").is_dir());
  assert!(std::path::Path::new(&config).exists());
  Ok(())
}

#[test]
#[serial]
fn test_report_on_empty_window_warns_and_succeeds() -> Result<()> {
  let (_dir, config) = init_workspace()?;

  tracker()
    .args(["--config", &config, "report", "--date", "2023-01-10"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No papers found"));
  Ok(())
}

#[test]
fn test_malformed_date_is_rejected() {
  tracker()
    .args(["report", "--date", "not-a-date"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid value"));
}
