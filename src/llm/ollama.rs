//! Ollama generation client.
//!
//! Talks to `POST {base_url}/api/generate` with
//! `{ model, prompt, stream, options }`. Non-streaming calls get one JSON
//! object back; streaming calls get line-delimited JSON objects, each with a
//! `response` fragment, terminated by one with `done: true`.

use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::GenerationSettings;
use crate::types::{AppError, Result};

/// Sampling options forwarded to the generation endpoint.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub num_predict: i32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            num_predict: 256,
        }
    }
}

/// Client for the Ollama generation endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    options: GenerationOptions,
    timeout: Duration,
}

impl OllamaClient {
    /// Build a client from settings.
    pub fn new(settings: &GenerationSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            options: GenerationOptions {
                temperature: settings.temperature,
                num_predict: settings.num_predict,
            },
            timeout: settings.timeout(),
        }
    }

    /// The configured model name.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str, stream: bool) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
            "options": {
                "temperature": self.options.temperature,
                "num_predict": self.options.num_predict,
            }
        })
    }

    fn send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_connect() {
            AppError::ServiceUnavailable(format!(
                "could not connect to the generation service at {}; is Ollama running?",
                self.base_url
            ))
        } else if e.is_timeout() {
            AppError::Generation("the generation request took too long; try a shorter prompt".to_string())
        } else {
            AppError::Generation(format!("request failed: {}", e))
        }
    }

    fn status_error(&self, status: reqwest::StatusCode, detail: String) -> AppError {
        let message = match status.as_u16() {
            400 => "bad request; the model input may be invalid".to_string(),
            404 => format!(
                "model '{}' not found; check that it is installed (`ollama pull {}`)",
                self.model, self.model
            ),
            408 => "request timed out; try a shorter prompt".to_string(),
            500 => "server error; the model might be overloaded".to_string(),
            503 => "service unavailable; try again in a moment".to_string(),
            _ => format!("unexpected status {}", status),
        };
        if detail.is_empty() {
            AppError::Generation(message)
        } else {
            AppError::Generation(format!("{} ({})", message, detail))
        }
    }

    /// Generate a complete response for the prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            "Requesting generation"
        );

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .json(&self.request_body(prompt, false))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, detail));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("failed to parse response: {}", e)))?;

        let text = body
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| AppError::Generation("no response text in reply".to_string()))?;

        debug!(chars = text.len(), "Generation complete");
        Ok(text.to_string())
    }

    /// Generate a streamed response for the prompt.
    ///
    /// Yields `response` fragments as they arrive and stops at the terminal
    /// `done: true` object. Malformed lines are skipped rather than treated
    /// as fatal.
    pub async fn generate_stream(
        &self,
        prompt: &str,
    ) -> Result<Box<dyn Stream<Item = Result<String>> + Send + Unpin>> {
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request_body(prompt, true))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, detail));
        }

        let mut byte_stream = response.bytes_stream();

        let output = stream! {
            let mut buffer = String::new();
            let mut done = false;

            while !done {
                let Some(chunk) = byte_stream.next().await else {
                    break;
                };

                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(AppError::Generation(format!("stream error: {}", e)));
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete JSON lines.
                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].trim().to_string();
                    buffer.drain(..=newline_pos);
                    if line.is_empty() {
                        continue;
                    }

                    let Ok(value) = serde_json::from_str::<Value>(&line) else {
                        continue;
                    };

                    if let Some(fragment) = value.get("response").and_then(|r| r.as_str()) {
                        if !fragment.is_empty() {
                            yield Ok(fragment.to_string());
                        }
                    }

                    if value.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
                        done = true;
                        break;
                    }
                }
            }
        };

        Ok(Box::new(Box::pin(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> GenerationSettings {
        GenerationSettings {
            base_url: base_url.to_string(),
            model: "deepseek-r1:8b".to_string(),
            temperature: 0.7,
            num_predict: 64,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn generate_returns_response_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "The answer is 42.",
                "done": true
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(&settings(&server.uri()));
        let answer = client.generate("what is the answer?").await.unwrap();
        assert_eq!(answer, "The answer is 42.");
    }

    #[tokio::test]
    async fn generate_maps_missing_model_to_actionable_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = OllamaClient::new(&settings(&server.uri()));
        let err = client.generate("hello").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("deepseek-r1:8b"));
        assert!(message.contains("installed"));
    }

    #[tokio::test]
    async fn stream_concatenates_fragments_and_stops_at_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"response\":\"Hello\",\"done\":false}\n",
            "{\"response\":\" world\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
            "{\"response\":\"IGNORED\",\"done\":false}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "application/x-ndjson"),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::new(&settings(&server.uri()));
        let mut stream = client.generate_stream("hi").await.unwrap();

        let mut collected = String::new();
        while let Some(fragment) = stream.next().await {
            collected.push_str(&fragment.unwrap());
        }
        assert_eq!(collected, "Hello world");
    }

    #[tokio::test]
    async fn request_body_carries_options() {
        let client = OllamaClient::new(&settings("http://localhost:11434"));
        let body = client.request_body("prompt", false);
        assert_eq!(body["model"], "deepseek-r1:8b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 64);
    }
}
