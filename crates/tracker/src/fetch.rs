//! Retrieval of paper metadata from the arXiv Atom feed.
//!
//! The [`PaperSource`] trait abstracts over where candidate papers come
//! from so the pipeline can be driven by a stub in tests. The production
//! implementation, [`ArxivFetcher`], queries the arXiv API per
//! configured category, pages through results, and normalizes each feed
//! entry into a [`Paper`] at [`Stage::Fetched`](crate::paper::Stage).
//!
//! Failure isolation happens at two levels: a page that cannot be
//! retrieved or parsed is recorded and skipped while the remaining pages
//! and categories continue, and a malformed entry within an otherwise
//! valid page is dropped and counted without affecting its siblings.

use std::{collections::BTreeMap, sync::Arc};

use quick_xml::{events::Event, Reader};
use url::Url;

use crate::{
  config::{Config, DateWindow},
  paper::{parse_identifier, Paper},
  retry::{with_retry, RetryPolicy},
};

use super::*;

/// A source of candidate papers for a date window.
#[async_trait::async_trait]
pub trait PaperSource: Send + Sync {
  /// Retrieves every paper the source knows about within the window.
  async fn fetch(&self, window: &DateWindow) -> Result<FetchReport>;
}

/// Retrieves feed documents over the wire.
///
/// The production transport is HTTP; tests substitute a canned one.
#[async_trait::async_trait]
pub trait FeedTransport: Send + Sync {
  /// Retrieves the document at `url`.
  async fn get(&self, url: Url) -> Result<String>;
}

/// reqwest-backed [`FeedTransport`].
struct HttpTransport {
  client: reqwest::Client,
}

#[async_trait::async_trait]
impl FeedTransport for HttpTransport {
  async fn get(&self, url: Url) -> Result<String> {
    let response = self.client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(TrackerError::UpstreamStatus(status.as_u16()));
    }
    Ok(response.text().await?)
  }
}

/// Result of a fetch pass, separating retrieved papers from the pages
/// that could not be read.
#[derive(Debug, Default)]
pub struct FetchReport {
  /// Papers retrieved, deduplicated by identifier.
  pub papers:   Vec<Paper>,
  /// Pages that failed permanently, keyed by category, with the reason.
  pub failures: Vec<(String, String)>,
  /// Feed entries dropped because required fields were missing or
  /// malformed.
  pub rejected: usize,
}

/// Fetches paper metadata from the arXiv Atom API.
///
/// # Examples
///
/// ```no_run
/// # use tracker::{config::{Config, DateWindow}, fetch::{ArxivFetcher, PaperSource}};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let fetcher = ArxivFetcher::from_config(&config)?;
/// let report = fetcher
///   .fetch(&DateWindow::single_day("2024-01-15".parse()?))
///   .await?;
/// println!("fetched {} papers", report.papers.len());
/// # Ok(())
/// # }
/// ```
pub struct ArxivFetcher {
  /// Base URL of the Atom query endpoint.
  base_url:    Url,
  /// How feed documents are retrieved.
  transport:   Arc<dyn FeedTransport>,
  /// Categories queried, one request sequence each.
  categories:  Vec<String>,
  /// Entries requested per page.
  page_size:   usize,
  /// Upper bound on entries collected per category.
  max_results: usize,
  /// Backoff policy for transient request failures.
  policy:      RetryPolicy,
}

impl ArxivFetcher {
  /// Builds a fetcher from configuration.
  pub fn from_config(config: &Config) -> Result<Self> {
    let transport = Arc::new(HttpTransport { client: reqwest::Client::new() });
    Self::with_transport(config, transport)
  }

  /// Builds a fetcher with an explicit transport.
  pub fn with_transport(config: &Config, transport: Arc<dyn FeedTransport>) -> Result<Self> {
    let base_url = Url::parse(&config.feed_url)
      .map_err(|e| TrackerError::Config(format!("invalid feed URL {:?}: {e}", config.feed_url)))?;

    Ok(Self {
      base_url,
      transport,
      categories: config.categories.clone(),
      page_size: config.page_size.max(1),
      max_results: config.max_results.max(1),
      policy: config.retry.clone(),
    })
  }

  /// Retrieves one feed page, retrying transient failures with backoff.
  async fn fetch_page(&self, category: &str, window: &DateWindow, start: usize) -> Result<String> {
    let query = format!(
      "cat:{category} AND submittedDate:[{}0000 TO {}2359]",
      window.start.format("%Y%m%d"),
      window.end.format("%Y%m%d"),
    );

    let mut url = self.base_url.clone();
    url
      .query_pairs_mut()
      .append_pair("search_query", &query)
      .append_pair("start", &start.to_string())
      .append_pair("max_results", &self.page_size.to_string())
      .append_pair("sortBy", "submittedDate")
      .append_pair("sortOrder", "ascending");

    with_retry(&self.policy, || {
      let url = url.clone();
      let transport = self.transport.clone();
      async move {
        debug!("Requesting feed page: {url}");
        transport.get(url).await
      }
    })
    .await
  }
}

#[async_trait::async_trait]
impl PaperSource for ArxivFetcher {
  async fn fetch(&self, window: &DateWindow) -> Result<FetchReport> {
    // BTreeMap keyed by identifier dedups cross-listed papers and keeps
    // the result order stable. First sighting wins.
    let mut papers: BTreeMap<String, Paper> = BTreeMap::new();
    let mut report = FetchReport::default();

    for category in &self.categories {
      // Offsets requested so far bound the loop even when pages fail.
      let mut start = 0;

      while start < self.max_results {
        let parsed = match self.fetch_page(category, window, start).await {
          Ok(page) => parse_feed(&page),
          Err(e) => Err(e),
        };

        let (entries, rejected) = match parsed {
          Ok(parsed) => parsed,
          Err(e) => {
            // Retries are spent inside fetch_page; what reaches here is
            // permanent for this page only.
            warn!("Skipping page at offset {start} for category {category}: {e}");
            report.failures.push((category.clone(), e.to_string()));
            start += self.page_size;
            continue;
          },
        };

        report.rejected += rejected;
        let page_len = entries.len() + rejected;

        for paper in entries {
          if window.contains(paper.published) {
            papers.entry(paper.id.clone()).or_insert(paper);
          }
        }

        // A short page means the feed is exhausted for this category.
        if page_len < self.page_size {
          break;
        }
        start += self.page_size;
      }
    }

    report.papers = papers.into_values().collect();
    debug!(
      "Fetch pass complete: {} papers, {} rejected entries, {} page failures",
      report.papers.len(),
      report.rejected,
      report.failures.len()
    );
    Ok(report)
  }
}

/// Accumulates one `<entry>` element's fields while walking the feed.
#[derive(Default)]
struct EntryDraft {
  id:        Option<(String, u32)>,
  title:     String,
  abstract_: String,
  published: Option<NaiveDate>,
  authors:   Vec<String>,
  category:  Option<String>,
}

impl EntryDraft {
  /// Converts the accumulated fields into a [`Paper`] if every required
  /// field was present.
  fn finish(self) -> Option<Paper> {
    let (id, version) = self.id?;
    let title = normalize_whitespace(&self.title);
    let abstract_text = normalize_whitespace(&self.abstract_);
    if title.is_empty() || abstract_text.is_empty() || self.authors.is_empty() {
      return None;
    }
    Some(Paper::fetched(
      id,
      title,
      self.authors,
      abstract_text,
      self.category?,
      self.published?,
      version,
    ))
  }
}

/// Parses an Atom feed document into papers, returning the papers and
/// the number of entries rejected for missing or malformed fields.
fn parse_feed(xml: &str) -> Result<(Vec<Paper>, usize)> {
  let mut reader = Reader::from_str(xml);
  reader.config_mut().trim_text(true);

  let mut path: Vec<String> = Vec::new();
  let mut draft: Option<EntryDraft> = None;
  let mut papers = Vec::new();
  let mut rejected = 0;
  let mut saw_feed = false;

  loop {
    match reader.read_event() {
      Ok(Event::Start(ref e)) => {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        if tag == "feed" {
          saw_feed = true;
        }
        if tag == "entry" && path.last().is_some_and(|parent| parent == "feed") {
          draft = Some(EntryDraft::default());
        }
        path.push(tag);
      },
      Ok(Event::Empty(ref e)) => {
        // Category elements are self-closing; the first term seen is the
        // primary category.
        if e.name().as_ref() == b"category" {
          if let Some(draft) = draft.as_mut() {
            if draft.category.is_none() {
              if let Ok(Some(attr)) = e.try_get_attribute("term") {
                if let Ok(term) = attr.unescape_value() {
                  draft.category = Some(term.into_owned());
                }
              }
            }
          }
        }
      },
      Ok(Event::Text(ref t)) => {
        let Some(draft) = draft.as_mut() else { continue };
        let Ok(text) = t.unescape() else { continue };
        match feed_field(&path) {
          Some(FeedField::Id) => {
            let raw = text.rsplit('/').next().unwrap_or(&text);
            draft.id = parse_identifier(raw).ok();
          },
          Some(FeedField::Title) => {
            draft.title.push(' ');
            draft.title.push_str(&text);
          },
          Some(FeedField::Abstract) => {
            draft.abstract_.push(' ');
            draft.abstract_.push_str(&text);
          },
          Some(FeedField::Published) => draft.published = parse_feed_date(&text),
          Some(FeedField::AuthorName) => draft.authors.push(normalize_whitespace(&text)),
          None => {},
        }
      },
      Ok(Event::End(ref e)) => {
        if e.name().as_ref() == b"entry" {
          match draft.take().and_then(EntryDraft::finish) {
            Some(paper) => papers.push(paper),
            None => {
              rejected += 1;
              trace!("Rejected feed entry with missing or malformed fields");
            },
          }
        }
        path.pop();
      },
      Ok(Event::Eof) => {
        // quick-xml reports plain Eof for truncated documents; an open
        // element path means the feed was cut off mid-stream.
        if !path.is_empty() || draft.is_some() {
          return Err(TrackerError::InvalidResponse("truncated feed document".to_string()));
        }
        break;
      },
      Ok(_) => {},
      Err(e) => return Err(TrackerError::InvalidResponse(format!("malformed feed XML: {e}"))),
    }
  }

  if !saw_feed {
    return Err(TrackerError::InvalidResponse("response is not an Atom feed".to_string()));
  }

  Ok((papers, rejected))
}

/// Fields of an `<entry>` we extract, identified by element path.
enum FeedField {
  Id,
  Title,
  Abstract,
  Published,
  AuthorName,
}

/// Maps the current element path to the feed field it carries, if any.
fn feed_field(path: &[String]) -> Option<FeedField> {
  match path {
    [.., entry, field] if entry == "entry" => match field.as_str() {
      "id" => Some(FeedField::Id),
      "title" => Some(FeedField::Title),
      "summary" => Some(FeedField::Abstract),
      "published" => Some(FeedField::Published),
      _ => None,
    },
    [.., entry, author, name] if entry == "entry" && author == "author" && name == "name" =>
      Some(FeedField::AuthorName),
    _ => None,
  }
}

/// Parses the feed's RFC 3339 timestamp down to a calendar date.
fn parse_feed_date(text: &str) -> Option<NaiveDate> {
  DateTime::parse_from_rfc3339(text.trim())
    .map(|dt| dt.date_naive())
    .ok()
    .or_else(|| NaiveDate::parse_from_str(text.trim().get(..10)?, "%Y-%m-%d").ok())
}

/// Collapses runs of whitespace, including the line breaks arXiv inserts
/// into long titles and abstracts, into single spaces.
fn normalize_whitespace(text: &str) -> String {
  text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
    <feed xmlns="http://www.w3.org/2005/Atom">
      <title>ArXiv Query Results</title>
      <entry>
        <id>http://arxiv.org/abs/2401.12345v2</id>
        <title>Adaptive Retrieval for
          Long-Context Models</title>
        <summary>We study adaptive retrieval strategies
          across long contexts.</summary>
        <published>2024-01-15T18:30:00Z</published>
        <author><name>Ada Lovelace</name></author>
        <author><name>Alan Turing</name></author>
        <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
        <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
      </entry>
      <entry>
        <id>http://arxiv.org/abs/not-a-real-id</id>
        <title>Broken Entry</title>
        <summary>Missing a valid identifier.</summary>
        <published>2024-01-15T18:30:00Z</published>
        <author><name>Nobody</name></author>
        <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
      </entry>
    </feed>"#;

  #[test]
  fn parses_entries_and_counts_rejects() {
    let (papers, rejected) = parse_feed(FEED).unwrap();

    assert_eq!(papers.len(), 1);
    assert_eq!(rejected, 1);

    let paper = &papers[0];
    assert_eq!(paper.id, "2401.12345");
    assert_eq!(paper.version, 2);
    assert_eq!(paper.title, "Adaptive Retrieval for Long-Context Models");
    assert_eq!(paper.abstract_text, "We study adaptive retrieval strategies across long contexts.");
    assert_eq!(paper.authors, vec!["Ada Lovelace", "Alan Turing"]);
    assert_eq!(paper.category, "cs.AI");
    assert_eq!(paper.published, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
  }

  #[test]
  fn rejects_non_feed_document() {
    let result = parse_feed("<html><body>rate limited</body></html>");
    assert!(matches!(result, Err(TrackerError::InvalidResponse(_))));
  }

  #[test]
  fn malformed_xml_is_invalid_response() {
    let result = parse_feed("<feed><entry><id>http://arxiv.org/abs/2401.00001v1</id>");
    assert!(matches!(result, Err(TrackerError::InvalidResponse(_))));
  }

  #[test]
  fn truncated_feed_is_invalid_response() {
    // Cut off after a complete entry but before </feed>; quick-xml
    // reports Eof without an error here, so the open path is the only
    // signal that the body was cut short.
    let cut = FEED.rsplit_once("</feed>").map(|(head, _)| head).unwrap();
    let result = parse_feed(cut);
    assert!(matches!(result, Err(TrackerError::InvalidResponse(_))));
  }

  #[test]
  fn whitespace_normalization_collapses_newlines() {
    assert_eq!(normalize_whitespace("  a\n  b\tc "), "a b c");
  }

  /// Serves two 503s before the canned feed, counting every request.
  struct FlakyTransport {
    calls: AtomicUsize,
  }

  #[async_trait::async_trait]
  impl FeedTransport for FlakyTransport {
    async fn get(&self, _url: Url) -> Result<String> {
      match self.calls.fetch_add(1, Ordering::SeqCst) {
        0 | 1 => Err(TrackerError::UpstreamStatus(503)),
        _ => Ok(FEED.to_string()),
      }
    }
  }

  /// Fails the first request permanently, serves the feed afterwards.
  struct FirstPageGoneTransport {
    calls: AtomicUsize,
  }

  #[async_trait::async_trait]
  impl FeedTransport for FirstPageGoneTransport {
    async fn get(&self, _url: Url) -> Result<String> {
      if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
        Err(TrackerError::UpstreamStatus(404))
      } else {
        Ok(FEED.to_string())
      }
    }
  }

  fn single_category_config(retry: RetryPolicy) -> Config {
    Config {
      categories: vec!["cs.AI".to_string()],
      retry,
      ..Config::default()
    }
  }

  #[tokio::test]
  async fn transient_statuses_retry_until_the_page_succeeds() {
    let config = single_category_config(RetryPolicy::immediate(3));
    let transport = Arc::new(FlakyTransport { calls: AtomicUsize::new(0) });
    let fetcher = ArxivFetcher::with_transport(&config, transport.clone()).unwrap();

    let window = DateWindow::single_day(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    let report = fetcher.fetch(&window).await.unwrap();

    // Two 503s are absorbed by the retry policy; the page's content
    // arrives and no page-level failure is recorded.
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.papers.len(), 1);
    assert_eq!(report.rejected, 1);
    assert!(report.failures.is_empty());
  }

  #[tokio::test]
  async fn permanent_page_failure_skips_only_that_page() {
    let config = single_category_config(RetryPolicy::immediate(1));
    let transport = Arc::new(FirstPageGoneTransport { calls: AtomicUsize::new(0) });
    let fetcher = ArxivFetcher::with_transport(&config, transport).unwrap();

    let window = DateWindow::single_day(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    let report = fetcher.fetch(&window).await.unwrap();

    assert_eq!(report.papers.len(), 1);
    assert_eq!(report.failures.len(), 1);
  }
}
