//! Chat-completion backends.
//!
//! Provides the [`LlmBackend`] trait, the shared message types, and two
//! implementations: a local Ollama-style server ([`ollama::OllamaClient`])
//! and the hosted Anthropic Messages API ([`anthropic::AnthropicClient`]).
//! The active backend is chosen from configuration via [`create_backend`].

pub mod anthropic;
pub mod ollama;
pub mod pool;
pub mod rate_limit;

use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::OpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Capitalised label used in saved transcripts.
    pub fn title(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{0} backend is not configured")]
    Disabled(&'static str),
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("invalid API key")]
    Unauthorized,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("worker failed: {0}")]
    Worker(String),
}

impl LlmError {
    /// Text shown to a chat user when generation fails.
    pub fn user_message(&self) -> String {
        match self {
            Self::Disabled(name) => {
                format!("The {name} backend is not configured. Please check your settings.")
            }
            Self::RateLimited { retry_after_secs } => format!(
                "Rate limit reached. Please wait {retry_after_secs} seconds before trying again."
            ),
            Self::Unauthorized => "Invalid API key. Please check your configuration.".to_string(),
            Self::Unavailable(_) => {
                "The language model is temporarily unavailable. Please try again later.".to_string()
            }
            other => format!("Error generating response: {other}"),
        }
    }
}

impl From<LlmError> for OpError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited { .. } => OpError::rate_limited(err.user_message()),
            _ => OpError::backend(err.user_message()),
        }
    }
}

/// Incremental text chunks of one reply.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Streaming variant. Backends without native streaming yield the whole
    /// reply as a single chunk.
    async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TextStream, LlmError> {
        let text = self.generate(messages).await?;
        Ok(Box::pin(futures_util::stream::once(async move {
            Ok(text)
        })))
    }

    async fn check_health(&self) -> bool;
}

/// Build the configured backend. `anthropic` without an API key falls back
/// to the local server.
pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(ollama::OllamaClient::new(config))),
        "anthropic" => match anthropic::AnthropicClient::from_config(config)? {
            Some(client) => Ok(Arc::new(client)),
            None => {
                tracing::warn!("anthropic backend selected but no API key set, using ollama");
                Ok(Arc::new(ollama::OllamaClient::new(config)))
            }
        },
        other => anyhow::bail!("unknown LLM backend: {other}. Supported: ollama, anthropic"),
    }
}
