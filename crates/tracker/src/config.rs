//! TOML application configuration.
//!
//! Configuration is a single TOML file (default location under the
//! platform config directory) deserialized into [`Config`]. Every field
//! has a default, so an empty file, or no file at all, yields a working
//! configuration pointed at the public arXiv export API and a local
//! Ollama endpoint.

use crate::retry::RetryPolicy;

use super::*;

/// Application settings for the paper pipeline.
///
/// # Examples
///
/// ```
/// use tracker::config::Config;
///
/// let config = Config::default()
///   .with_keywords(["transformer", "agent"])
///   .with_relevance_threshold(3.0);
/// assert_eq!(config.keywords.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// arXiv categories to track.
  pub categories:          Vec<String>,
  /// Keywords the relevance filter scores against.
  pub keywords:            Vec<String>,
  /// Papers scoring below this 0-10 threshold are skipped.
  pub relevance_threshold: f64,
  /// How many days back from the target date the fetch window reaches.
  pub lookback_days:       u32,
  /// Upper bound on papers fetched per category per run.
  pub max_results:         usize,
  /// Page size for upstream pagination.
  pub page_size:           usize,
  /// Maximum concurrent in-flight summarization requests.
  pub concurrency:         usize,
  /// Failed attempts permitted per paper per stage before it is marked
  /// permanently failed.
  pub retry_budget:        u32,
  /// Location of the SQLite database file.
  pub database_path:       PathBuf,
  /// Directory rendered reports are written into.
  pub reports_dir:         PathBuf,
  /// Base URL of the arXiv export API.
  pub feed_url:            String,
  /// Host of the Ollama-compatible generation service.
  pub llm_host:            String,
  /// Model name requested from the generation service.
  pub llm_model:           String,
  /// Backoff policy shared by the fetcher and summarizer.
  pub retry:               RetryPolicy,
}

impl Default for Config {
  fn default() -> Self {
    let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("tracker");
    Self {
      categories:          ["cs.AI", "cs.LG", "cs.CL", "cs.SE", "cs.CR"]
        .map(str::to_string)
        .to_vec(),
      keywords:            Vec::new(),
      relevance_threshold: 1.0,
      lookback_days:       1,
      max_results:         100,
      page_size:           50,
      concurrency:         4,
      retry_budget:        3,
      database_path:       data_dir.join("tracker.db"),
      reports_dir:         data_dir.join("reports"),
      feed_url:            "https://export.arxiv.org/api/query".to_string(),
      llm_host:            "http://localhost:11434".to_string(),
      llm_model:           "llama3.2:3b".to_string(),
      retry:               RetryPolicy::default(),
    }
  }
}

impl Config {
  /// Returns the default path for the configuration file.
  pub fn default_path() -> PathBuf {
    dirs::config_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join("tracker")
      .join("config.toml")
  }

  /// Loads a configuration from a TOML file, falling back to defaults if
  /// the file does not exist.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    if !path.exists() {
      debug!("No config file at {path:?}, using defaults");
      return Ok(Self::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
  }

  /// Writes this configuration to a TOML file, creating parent
  /// directories as needed.
  pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(self)?)?;
    Ok(())
  }

  /// Sets the database path.
  pub fn with_database_path(mut self, path: impl AsRef<Path>) -> Self {
    self.database_path = path.as_ref().to_path_buf();
    self
  }

  /// Sets the reports directory.
  pub fn with_reports_dir(mut self, path: impl AsRef<Path>) -> Self {
    self.reports_dir = path.as_ref().to_path_buf();
    self
  }

  /// Replaces the tracked categories.
  pub fn with_categories<I: IntoIterator<Item = impl Into<String>>>(mut self, categories: I) -> Self {
    self.categories = categories.into_iter().map(Into::into).collect();
    self
  }

  /// Replaces the filter keywords.
  pub fn with_keywords<I: IntoIterator<Item = impl Into<String>>>(mut self, keywords: I) -> Self {
    self.keywords = keywords.into_iter().map(Into::into).collect();
    self
  }

  /// Sets the relevance threshold.
  pub fn with_relevance_threshold(mut self, threshold: f64) -> Self {
    self.relevance_threshold = threshold;
    self
  }
}

/// An inclusive date range papers are fetched and reported over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
  /// First day of the window.
  pub start: NaiveDate,
  /// Last day of the window.
  pub end:   NaiveDate,
}

impl DateWindow {
  /// A window covering a single day.
  pub fn single_day(date: NaiveDate) -> Self { Self { start: date, end: date } }

  /// A window ending at `end` and reaching `lookback_days - 1` days
  /// further back, so `lookback_days = 1` is just the end day.
  pub fn lookback(end: NaiveDate, lookback_days: u32) -> Self {
    let days = lookback_days.max(1) - 1;
    Self { start: end - chrono::Duration::days(i64::from(days)), end }
  }

  /// Whether a date falls inside the window.
  pub fn contains(&self, date: NaiveDate) -> bool { self.start <= date && date <= self.end }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_round_trip_through_toml() {
    let config = Config::default();
    let serialized = toml::to_string_pretty(&config).unwrap();
    let parsed: Config = toml::from_str(&serialized).unwrap();
    assert_eq!(parsed.categories, config.categories);
    assert_eq!(parsed.relevance_threshold, config.relevance_threshold);
    assert_eq!(parsed.retry_budget, config.retry_budget);
  }

  #[test]
  fn test_partial_file_fills_defaults() {
    let parsed: Config = toml::from_str(r#"keywords = ["agents"]"#).unwrap();
    assert_eq!(parsed.keywords, vec!["agents".to_string()]);
    assert_eq!(parsed.categories, Config::default().categories);
  }

  #[test]
  fn test_lookback_window() {
    let end = NaiveDate::from_ymd_opt(2023, 1, 12).unwrap();
    let window = DateWindow::lookback(end, 3);
    assert_eq!(window.start, NaiveDate::from_ymd_opt(2023, 1, 10).unwrap());
    assert!(window.contains(NaiveDate::from_ymd_opt(2023, 1, 11).unwrap()));
    assert!(!window.contains(NaiveDate::from_ymd_opt(2023, 1, 9).unwrap()));

    // A one-day lookback is just the end day.
    assert_eq!(DateWindow::lookback(end, 1), DateWindow::single_day(end));
    assert_eq!(DateWindow::lookback(end, 0), DateWindow::single_day(end));
  }
}
