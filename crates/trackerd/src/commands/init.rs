//! Command for setting up a tracker environment.

use super::*;

/// Arguments for the `init` command.
#[derive(Args, Clone)]
pub struct InitOptions {
  /// Where to create the database file, overriding the platform default
  #[arg(long)]
  pub db_path:     Option<PathBuf>,

  /// Where rendered reports are written, overriding the platform default
  #[arg(long)]
  pub reports_dir: Option<PathBuf>,
}

/// Creates the database, report directory, and configuration file.
pub async fn init(config_path: PathBuf, config: Config, options: InitOptions) -> Result<()> {
  let mut config = config;
  if let Some(db_path) = options.db_path {
    config = config.with_database_path(db_path);
  }
  if let Some(reports_dir) = options.reports_dir {
    config = config.with_reports_dir(reports_dir);
  }

  if let Some(parent) = config.database_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::create_dir_all(&config.reports_dir)?;

  Store::open(&config.database_path).await?;
  config.write(&config_path)?;

  println!(
    "{} Initialized tracker with\nConfig path: {:?}\nDatabase path: {:?}\nReports directory: {:?}",
    style(SUCCESS_PREFIX).green(),
    config_path,
    config.database_path,
    config.reports_dir,
  );
  Ok(())
}
