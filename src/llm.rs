//! Client for the hosted text-generation model.
//!
//! The model is reached through a single POST per prompt. The service
//! never retries; a failure is reported to the caller, which answers the
//! browser with a 500 so the student can simply click again.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request to model failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model returned HTTP {status}")]
    Status { status: u16 },
    #[error("model response could not be parsed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("model returned an empty completion")]
    EmptyCompletion,
}

/// A single-shot completion backend.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider label used in logs and `/healthz`.
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;
}

/// Connection settings for [`HttpLlmClient`].
#[derive(Clone, Debug)]
pub struct LlmSettings {
    /// Base URL; the model identifier is appended as the last path segment.
    pub api_url: String,
    pub api_token: String,
    pub model: String,
    pub timeout_ms: u64,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    result: Option<CompletionResult>,
}

#[derive(Deserialize)]
struct CompletionResult {
    #[serde(default)]
    response: Option<String>,
}

/// Calls a Workers-AI style `run/<model>` endpoint with a bearer token.
pub struct HttpLlmClient {
    settings: LlmSettings,
    url: String,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;
        let url = format!(
            "{}/{}",
            settings.api_url.trim_end_matches('/'),
            settings.model.trim_start_matches('/')
        );
        Ok(Self {
            settings,
            url,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Pull the completion text out of either supported response shape.
fn extract_completion(body: &str) -> Result<String, LlmError> {
    let env: CompletionEnvelope = serde_json::from_str(body)?;
    let text = env
        .response
        .or_else(|| env.result.and_then(|r| r.response))
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(LlmError::EmptyCompletion);
    }
    Ok(text)
}

#[async_trait::async_trait]
impl LlmClient for HttpLlmClient {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.settings.api_token)
            .json(&CompletionRequest { prompt, max_tokens })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(model = %self.settings.model, status = status.as_u16(), "model call rejected");
            return Err(LlmError::Status {
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        extract_completion(&body)
    }
}
