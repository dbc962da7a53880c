//! Embedding client for the local Ollama embedding endpoint.
//!
//! The backing server is assumed to be unreliable under load: every call gets
//! a bounded number of attempts with a growing per-attempt timeout, jitter to
//! avoid thundering-herd against a shared local server, and sleeps between
//! attempts (longer after a timeout, which usually means the server is
//! overloaded rather than down). Sleeping goes through the [`Sleeper`] trait
//! so tests can run the whole policy without waiting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::EmbeddingSettings;
use crate::types::{AppError, Result};

/// Retry and timeout policy for embedding calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per call.
    pub max_attempts: u32,
    /// Timeout of attempt 0; attempt `k` waits `base_timeout * factor^k`.
    pub base_timeout: Duration,
    /// Growth factor for timeouts and inter-attempt sleeps.
    pub backoff_factor: f64,
    /// Upper bound of the uniform random jitter added to each attempt's
    /// timeout, as a fraction of that timeout (0.2 = up to +20%).
    pub max_jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_timeout: Duration::from_secs(90),
            backoff_factor: 1.5,
            max_jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Deterministic timeout for attempt `k` (0-indexed), before jitter.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout
            .mul_f64(self.backoff_factor.powi(attempt as i32))
    }

    /// Timeout for attempt `k` with random jitter applied.
    pub fn jittered_timeout_for(&self, attempt: u32) -> Duration {
        let timeout = self.timeout_for(attempt);
        if self.max_jitter <= 0.0 {
            return timeout;
        }
        let jitter = rand::rng().random_range(0.0..self.max_jitter);
        timeout.mul_f64(1.0 + jitter)
    }

    /// Sleep before the attempt after attempt `k`. Timeouts get a longer
    /// recovery window than plain failures.
    pub fn backoff_delay(&self, attempt: u32, after_timeout: bool) -> Duration {
        let secs = self.backoff_factor.powi(attempt as i32);
        let secs = if after_timeout { secs * 5.0 } else { secs };
        Duration::from_secs_f64(secs)
    }
}

/// Abstraction over sleeping so retry behavior is testable without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// One attempt's failure mode. Timeouts are tracked separately because they
/// drive a longer recovery sleep.
#[derive(Debug)]
enum AttemptError {
    Timeout,
    Connect(String),
    Http(String),
    Malformed(String),
    Dimension { expected: usize, actual: usize },
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Timeout => write!(f, "request timed out"),
            AttemptError::Connect(e) => write!(f, "connection failed: {}", e),
            AttemptError::Http(e) => write!(f, "request failed: {}", e),
            AttemptError::Malformed(e) => write!(f, "malformed response: {}", e),
            AttemptError::Dimension { expected, actual } => {
                write!(f, "unexpected embedding dimension: expected {}, got {}", expected, actual)
            }
        }
    }
}

/// Client for the Ollama embeddings endpoint.
///
/// Constructed once and passed down explicitly; there is no process-wide
/// instance.
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    max_text_length: usize,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl EmbeddingClient {
    /// Build a client from settings.
    pub fn new(settings: &EmbeddingSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
            max_text_length: settings.max_text_length,
            policy: RetryPolicy {
                max_attempts: settings.max_attempts,
                base_timeout: settings.base_timeout(),
                backoff_factor: settings.backoff_factor,
                max_jitter: settings.max_jitter,
            },
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper (used by tests to skip real waiting).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Expected vector dimensionality of the configured model.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The configured model name.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Embed a text, retrying per the policy.
    ///
    /// The input is truncated to the configured maximum length before any
    /// request is made. On success the returned vector is guaranteed to have
    /// the configured dimensionality; after exhausting retries the call fails
    /// with a typed error and never fabricates a vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let prompt = self.truncated(text);
        if prompt.len() < text.len() {
            debug!(
                original = text.chars().count(),
                sent = prompt.chars().count(),
                "Truncated text before embedding"
            );
        }

        let mut last_error: Option<AttemptError> = None;

        for attempt in 0..self.policy.max_attempts {
            let timeout = self.policy.jittered_timeout_for(attempt);
            debug!(
                attempt = attempt + 1,
                max = self.policy.max_attempts,
                timeout_ms = timeout.as_millis() as u64,
                "Requesting embedding"
            );

            match self.request_once(prompt, timeout).await {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Embedding attempt failed");
                    let timed_out = matches!(e, AttemptError::Timeout);
                    last_error = Some(e);

                    if attempt + 1 < self.policy.max_attempts {
                        let delay = self.policy.backoff_delay(attempt, timed_out);
                        self.sleeper.sleep(delay).await;
                    }
                }
            }
        }

        let Some(last) = last_error else {
            return Err(AppError::Embedding(
                "retry policy allowed zero attempts".to_string(),
            ));
        };
        if let AttemptError::Connect(e) = &last {
            return Err(AppError::ServiceUnavailable(format!(
                "embedding service at {} is unreachable ({}); is Ollama running?",
                self.base_url, e
            )));
        }
        Err(AppError::Embedding(format!(
            "no usable embedding after {} attempts: {}",
            self.policy.max_attempts, last
        )))
    }

    async fn request_once(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> std::result::Result<Vec<f32>, AttemptError> {
        let response = self
            .http
            .post(format!("{}/api/embeddings", self.base_url))
            .timeout(timeout)
            .json(&serde_json::json!({ "model": self.model, "prompt": prompt }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Timeout
                } else if e.is_connect() {
                    AttemptError::Connect(e.to_string())
                } else {
                    AttemptError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Http(format!("server returned {}", status)));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Malformed(e.to_string()))?;

        if body.embedding.is_empty() {
            return Err(AttemptError::Malformed(
                "no embedding in response".to_string(),
            ));
        }
        if body.embedding.len() != self.dimensions {
            return Err(AttemptError::Dimension {
                expected: self.dimensions,
                actual: body.embedding.len(),
            });
        }

        Ok(body.embedding)
    }

    /// Truncate to at most `max_text_length` characters.
    fn truncated<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.max_text_length) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}
