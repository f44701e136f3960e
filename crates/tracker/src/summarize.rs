//! Summary generation through a local Ollama model.
//!
//! The [`Generate`] trait is the seam between the pipeline and the
//! language model: production code uses [`OllamaGenerator`] against a
//! locally running Ollama service, while tests substitute a
//! deterministic stub. The [`Summarizer`] drives generation over every
//! paper awaiting a summary with bounded concurrency, isolating
//! per-paper failures so one bad generation never stalls the batch.
//!
//! Generated content is validated at the boundary before it is stored:
//! the model must return a JSON object with a non-empty summary and a
//! plausible number of key points, otherwise the attempt counts as a
//! permanent failure for this run.

use std::sync::Arc;

use futures::{stream, StreamExt};
use url::Url;

use crate::{
  config::Config,
  paper::{Paper, Stage},
  retry::{with_retry, RetryPolicy},
  store::{StageFields, Store},
};

use super::*;

/// Produces summary content for a paper.
#[async_trait::async_trait]
pub trait Generate: Send + Sync {
  /// Generates a validated summary for the paper.
  async fn generate(&self, paper: &Paper) -> Result<Generated>;
}

/// Validated output of a generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generated {
  /// Prose summary of the paper.
  pub summary:    String,
  /// Ordered key points, between one and eight entries.
  pub key_points: Vec<String>,
}

/// A single message in an Ollama chat exchange.
#[derive(Debug, Serialize, Deserialize)]
struct Message {
  role:    String,
  content: String,
}

/// Chat request body for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest<'a> {
  model:    &'a str,
  messages: Vec<Message>,
  stream:   bool,
}

/// The subset of the Ollama chat response the summarizer consumes.
#[derive(Deserialize)]
struct ChatResponse {
  message: Message,
}

/// Generator backed by a locally running Ollama service.
///
/// # Examples
///
/// ```
/// # use tracker::summarize::OllamaGenerator;
/// let generator = OllamaGenerator::new()
///   .with_host("http://localhost:11434")
///   .with_model("llama3.2:3b");
/// ```
pub struct OllamaGenerator {
  /// Resolved URL of the chat endpoint.
  url:    Url,
  /// Model name passed through to Ollama.
  model:  String,
  /// Shared HTTP client.
  client: reqwest::Client,
}

impl Default for OllamaGenerator {
  fn default() -> Self { Self::new() }
}

impl OllamaGenerator {
  /// Creates a generator targeting localhost with the default model.
  pub fn new() -> Self {
    Self {
      url:    Url::parse("http://localhost:11434/api/chat").unwrap(),
      model:  "llama3.2:3b".to_string(),
      client: reqwest::Client::new(),
    }
  }

  /// Builds a generator from configuration.
  pub fn from_config(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.llm_host)
      .map_err(|e| TrackerError::Config(format!("invalid LLM host {:?}: {e}", config.llm_host)))?;
    let url = base
      .join("api/chat")
      .map_err(|e| TrackerError::Config(format!("invalid LLM host {:?}: {e}", config.llm_host)))?;

    Ok(Self { url, model: config.llm_model.clone(), client: reqwest::Client::new() })
  }

  /// Sets the host URL, keeping the current one if the new value does
  /// not parse.
  pub fn with_host(mut self, host: &str) -> Self {
    match Url::parse(host).and_then(|base| base.join("api/chat")) {
      Ok(url) => self.url = url,
      Err(e) => warn!("Ignoring unparseable LLM host {host:?}: {e}"),
    }
    self
  }

  /// Sets the model name passed to Ollama.
  pub fn with_model(mut self, model: impl Into<String>) -> Self {
    self.model = model.into();
    self
  }
}

#[async_trait::async_trait]
impl Generate for OllamaGenerator {
  async fn generate(&self, paper: &Paper) -> Result<Generated> {
    let request = ChatRequest {
      model:    &self.model,
      messages: vec![Message { role: "user".to_string(), content: build_prompt(paper) }],
      stream:   false,
    };

    debug!("Requesting summary for {} from {}", paper.id, self.url);
    let response = self.client.post(self.url.clone()).json(&request).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(TrackerError::UpstreamStatus(status.as_u16()));
    }

    let chat: ChatResponse = response.json().await?;
    parse_generated(&chat.message.content)
  }
}

/// Builds the summarization prompt for a paper.
fn build_prompt(paper: &Paper) -> String {
  format!(
    "Summarize the following research paper for a daily digest.\n\
     Respond with only a JSON object of the form\n\
     {{\"summary\": \"...\", \"key_points\": [\"...\"]}}\n\
     where summary is two to four sentences and key_points has two to\n\
     five entries.\n\n\
     Title: {}\nAuthors: {}\nAbstract: {}",
    paper.title,
    paper.authors.join(", "),
    paper.abstract_text,
  )
}

/// Parses and validates model output into a [`Generated`].
///
/// Models frequently wrap the JSON object in prose or code fences, so a
/// failed parse of the full content falls back to the outermost brace
/// pair before giving up.
fn parse_generated(content: &str) -> Result<Generated> {
  let generated: Generated = serde_json::from_str(content)
    .or_else(|_| {
      let start = content.find('{');
      let end = content.rfind('}');
      match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&content[start..=end]),
        _ => serde_json::from_str(content),
      }
    })
    .map_err(|e| TrackerError::InvalidResponse(format!("unparseable summary payload: {e}")))?;

  let summary = generated.summary.trim().to_string();
  if summary.is_empty() {
    return Err(TrackerError::InvalidResponse("generated summary is empty".to_string()));
  }

  let key_points: Vec<String> = generated
    .key_points
    .iter()
    .map(|point| point.trim().to_string())
    .filter(|point| !point.is_empty())
    .collect();
  if key_points.is_empty() || key_points.len() > 8 {
    return Err(TrackerError::InvalidResponse(format!(
      "expected 1 to 8 key points, got {}",
      key_points.len()
    )));
  }

  Ok(Generated { summary, key_points })
}

/// Per-paper outcome of one summarization attempt.
enum PaperOutcome {
  Summarized(String),
  Failed { id: String, reason: String, exhausted: bool },
  Stale(String),
}

/// Aggregate result of a summarization pass.
#[derive(Debug, Default)]
pub struct SummarizeOutcome {
  /// Papers successfully advanced to the summarized stage.
  pub summarized: usize,
  /// Papers whose attempt failed this run, with the reason.
  pub failures:   Vec<(String, String)>,
  /// Papers whose failure exhausted the retry budget and are now
  /// permanently failed.
  pub exhausted:  usize,
}

/// Drives summary generation for every paper awaiting one.
pub struct Summarizer {
  /// Generation backend.
  generator:   Arc<dyn Generate>,
  /// Backoff policy for transient generation failures.
  policy:      RetryPolicy,
  /// Maximum in-flight generations.
  concurrency: usize,
}

impl Summarizer {
  /// Creates a summarizer over the given backend.
  pub fn new(generator: Arc<dyn Generate>, policy: RetryPolicy, concurrency: usize) -> Self {
    Self { generator, policy, concurrency: concurrency.max(1) }
  }

  /// Builds a summarizer with an Ollama backend from configuration.
  pub fn from_config(config: &Config) -> Result<Self> {
    Ok(Self::new(
      Arc::new(OllamaGenerator::from_config(config)?),
      config.retry.clone(),
      config.concurrency,
    ))
  }

  /// Summarizes every paper currently awaiting a summary.
  ///
  /// Papers are processed with bounded concurrency. A paper whose
  /// generation fails is recorded against its retry budget and left for
  /// a later run; only store failures abort the pass.
  pub async fn summarize_pending(&self, store: &Store) -> Result<SummarizeOutcome> {
    let pending = store.get_pending(Stage::Filtered).await?;
    if pending.is_empty() {
      debug!("No papers awaiting summarization");
      return Ok(SummarizeOutcome::default());
    }
    debug!("Summarizing {} papers with concurrency {}", pending.len(), self.concurrency);

    let results: Vec<Result<PaperOutcome>> = stream::iter(pending.into_iter().map(|paper| {
      let store = store.clone();
      let generator = Arc::clone(&self.generator);
      let policy = self.policy.clone();
      async move { summarize_one(&store, generator.as_ref(), &policy, paper).await }
    }))
    .buffer_unordered(self.concurrency)
    .collect()
    .await;

    let mut outcome = SummarizeOutcome::default();
    for result in results {
      match result? {
        PaperOutcome::Summarized(_) => outcome.summarized += 1,
        PaperOutcome::Failed { id, reason, exhausted } => {
          if exhausted {
            warn!("Giving up on {id} permanently: {reason}");
            outcome.exhausted += 1;
          }
          outcome.failures.push((id, reason));
        },
        PaperOutcome::Stale(id) => trace!("Skipping {id}, already handled concurrently"),
      }
    }
    Ok(outcome)
  }
}

/// Generates and stores the summary for a single paper.
///
/// Returns `Err` only for failures that must abort the whole pass.
async fn summarize_one(
  store: &Store,
  generator: &dyn Generate,
  policy: &RetryPolicy,
  paper: Paper,
) -> Result<PaperOutcome> {
  let generated = match with_retry(policy, || generator.generate(&paper)).await {
    Ok(generated) => generated,
    Err(e) if e.is_fatal() => return Err(e),
    Err(e) => {
      let reason = e.to_string();
      let exhausted = store.mark_failed(&paper.id, Stage::Summarized, &reason).await?;
      return Ok(PaperOutcome::Failed { id: paper.id, reason, exhausted });
    },
  };

  let fields = StageFields::Summarized {
    summary:    generated.summary,
    key_points: generated.key_points,
  };
  match store.advance(&paper.id, Stage::Filtered, Stage::Summarized, fields).await {
    Ok(()) => Ok(PaperOutcome::Summarized(paper.id)),
    Err(TrackerError::StaleStage { id, .. }) => Ok(PaperOutcome::Stale(id)),
    Err(e) => Err(e),
  }
}
