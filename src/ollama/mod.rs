//! Streaming client for an Ollama-compatible generation backend.
//!
//! The backend answers `POST /api/generate` with newline-delimited JSON
//! records; each record may carry an incremental `response` fragment and a
//! `done` flag. Fragments are concatenated until `done` is seen, then the
//! result is trimmed. The client checks the cancellation token at every
//! received chunk and tears the connection down via `select!` when the token
//! fires, so no stray output from a cancelled call ever reaches the job.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rowgen::ollama::OllamaClient;
//! use tokio_util::sync::CancellationToken;
//!
//! let client = OllamaClient::new("http://localhost:11434", "llama3.2");
//! let text = client.generate("Say hi", &CancellationToken::new()).await?;
//! ```

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::env;
use tokio_util::sync::CancellationToken;

use crate::error::{GenerateError, GenerateResult};
use crate::job::Generator;
use crate::logs::log_warning;

/// Default Ollama server URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, Serialize)]
pub struct SamplingOptions {
    pub temperature: f64,
    pub top_p: f64,
    /// Fixed seed for reproducible runs. `None` opts into non-deterministic
    /// sampling; the field is then omitted from the request entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub num_ctx: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            seed: Some(42),
            num_ctx: 8192,
        }
    }
}

/// Ollama API client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    system_prompt: Option<String>,
    options: SamplingOptions,
}

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: &'a SamplingOptions,
}

/// One newline-delimited record of the streamed response.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Response of `/api/tags`.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    /// Create a client for the given server and model.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            system_prompt: None,
            options: SamplingOptions::default(),
        }
    }

    /// Create a client from `OLLAMA_URL` / `OLLAMA_MODEL` environment
    /// variables, falling back to the default server URL.
    pub fn from_env() -> Option<Self> {
        let _ = dotenvy::dotenv();
        let url = env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = env::var("OLLAMA_MODEL").ok()?;
        Some(Self::new(url, model))
    }

    /// Set the system prompt sent with every request.
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.system_prompt = if system.is_empty() { None } else { Some(system) };
        self
    }

    /// Set the sampling options.
    pub fn with_options(mut self, options: SamplingOptions) -> Self {
        self.options = options;
        self
    }

    /// Server URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model name sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one generation call, streaming until the backend signals
    /// completion. Returns the trimmed full text.
    pub async fn generate(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> GenerateResult<String> {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            system: self.system_prompt.as_deref(),
            options: &self.options,
        };

        let request = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(GenerateError::Cancelled),
            response = request => response?,
        };

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GenerateError::Auth(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(GenerateError::Api {
                status: status.as_u16(),
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut full_response = String::new();
        let mut done = false;

        while !done {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(GenerateError::Cancelled),
                next = stream.next() => next,
            };

            let bytes = match next {
                Some(bytes) => bytes?,
                None => break,
            };
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if consume_line(&line, &mut full_response) {
                    done = true;
                    break;
                }
            }
        }

        // A record may arrive without a trailing newline.
        if !done && !buffer.is_empty() {
            consume_line(&buffer, &mut full_response);
        }

        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }

        let result = full_response.trim().to_string();
        if result.is_empty() {
            return Err(GenerateError::EmptyResponse);
        }
        Ok(result)
    }

    /// List the models available on the server (`/api/tags`).
    pub async fn list_models(&self) -> GenerateResult<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerateError::Api {
                status: status.as_u16(),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::InvalidChunk(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Parse one NDJSON line into the accumulator. Returns whether the record
/// carried the completion flag. Unparseable lines are skipped; a bad chunk
/// must not lose the fragments already received.
fn consume_line(line: &[u8], full_response: &mut String) -> bool {
    let Some(start) = line.iter().position(|b| !b.is_ascii_whitespace()) else {
        return false;
    };
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).unwrap_or(start) + 1;

    match serde_json::from_slice::<GenerateChunk>(&line[start..end]) {
        Ok(chunk) => {
            if let Some(fragment) = chunk.response {
                full_response.push_str(&fragment);
            }
            chunk.done
        }
        Err(e) => {
            log_warning(format!("Skipping malformed response chunk: {}", e));
            false
        }
    }
}

impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str, cancel: &CancellationToken) -> GenerateResult<String> {
        OllamaClient::generate(self, prompt, cancel).await
    }
}
