use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion endpoint returned {0}")]
    Status(StatusCode),

    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion response had no content")]
    Empty,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError>;
}

// ---------------------------------------------------------------------------
// Wire types (OpenAI-compatible chat completions)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// Returns `None` when no API key is configured.
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Some(Self {
            inner: Arc::new(Inner {
                http,
                base_url: config.base_url.trim_end_matches('/').to_owned(),
                api_key,
                model: config.model.clone(),
            }),
        }))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.inner.base_url);
        debug!(url = %url, model = %self.inner.model, "Requesting chat completion");

        let body = ChatRequest {
            model: &self.inner.model,
            messages: [
                Message { role: "system", content: system },
                Message { role: "user", content: user },
            ],
            temperature: 0.3,
            max_tokens: 500,
        };

        let resp = self
            .inner
            .http
            .post(&url)
            .bearer_auth(&self.inner.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CompletionError::Status(status));
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .ok_or(CompletionError::Empty)
    }
}
