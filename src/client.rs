//! Completion endpoint client.
//!
//! The sequencer talks to the hosted model through the `CompletionClient`
//! trait; `OpenAiClient` is the production implementation against an
//! OpenAI-compatible chat-completions endpoint. Calls are blocking: the
//! session model is one user turn, one completion, one response.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ApiConfig;

/// Role tag on a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    #[allow(dead_code)]
    Assistant,
}

/// One role-tagged message in a completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("api key environment variable {var} is not set")]
    MissingApiKey { var: String },
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion endpoint returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion endpoint returned empty text")]
    Empty,
}

/// External completion function: ordered role-tagged messages in,
/// generated text out.
pub trait CompletionClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError>;
}

/// Blocking HTTP client for an OpenAI-compatible chat-completions API.
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiClient {
    /// Build a client from the `[api]` config section. The key is read
    /// from the environment variable the config names.
    pub fn from_config(api: &ApiConfig) -> Result<Self, CompletionError> {
        let api_key =
            std::env::var(&api.key_env).map_err(|_| CompletionError::MissingApiKey {
                var: api.key_env.clone(),
            })?;

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            model: api.model.clone(),
            temperature: api.temperature,
        })
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        debug!(
            model = %self.model,
            message_count = messages.len(),
            "completion_request"
        );

        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            warn!(status, "completion_request_failed");
            return Err(CompletionError::Api { status, body });
        }

        let parsed: ChatResponse = response.json()?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CompletionError::Empty);
        }

        debug!(chars = text.len(), "completion_response");
        Ok(text)
    }
}
