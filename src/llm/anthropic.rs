//! Client for the hosted Anthropic Messages API.
//!
//! Every call passes through a sliding-window [`RateLimiter`] first. Besides
//! plain chat generation the client offers three helpers used when saving
//! conversations: a one-line summary, a short list of insights, and a
//! structured pattern analysis.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::rate_limit::{RateLimitStatus, RateLimiter};
use super::{ChatMessage, LlmBackend, LlmError, Role};
use crate::config::LlmConfig;

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const MAX_SUMMARY_CHARS: usize = 150;
const MAX_INSIGHTS: usize = 3;

const SUMMARY_PROMPT: &str = "Summarize this conversation in ONE concise sentence \
(max 100 characters). Focus on the main topic or outcome.\n\nConversation:\n";

const INSIGHTS_PROMPT: &str = "Extract 2-3 key insights or takeaways from this conversation.\n\
Return as a simple bulleted list (- item).\n\nConversation:\n";

const ANALYSIS_PROMPT: &str = r#"Analyze this conversation and extract:
1. Mood (stressed, excited, neutral, focused, confused, reflective)
2. Energy level (high, medium, low)
3. Main topics discussed (list 2-3)
4. Goals mentioned (list any)
5. Challenges or blockers mentioned (list any)

Respond in this exact JSON format:
{
    "mood": "neutral",
    "energy": "medium",
    "topics": ["topic1", "topic2"],
    "goals": ["goal1"],
    "challenges": ["challenge1"]
}"#;

/// Result of [`AnthropicClient::analyze_patterns`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternAnalysis {
    pub mood: String,
    pub energy: String,
    pub topics: Vec<String>,
    pub goals: Vec<String>,
    pub challenges: Vec<String>,
}

impl Default for PatternAnalysis {
    fn default() -> Self {
        Self {
            mood: "neutral".into(),
            energy: "medium".into(),
            topics: Vec::new(),
            goals: Vec::new(),
            challenges: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    system_prompt: String,
    limiter: Mutex<RateLimiter>,
}

impl AnthropicClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        system_prompt: &str,
        max_requests_per_minute: usize,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Disabled("anthropic"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|e| LlmError::InvalidResponse(format!("invalid API key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        tracing::info!(model, "anthropic client initialized");
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            limiter: Mutex::new(RateLimiter::per_minute(max_requests_per_minute)),
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, LlmError> {
        let Some(key) = config
            .anthropic_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
        else {
            return Ok(None);
        };
        Self::new(
            key,
            &config.anthropic_base_url,
            &config.anthropic_model,
            &config.system_prompt,
            config.max_requests_per_minute,
            Duration::from_secs(config.request_timeout_secs.max(1)),
        )
        .map(Some)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .status(Instant::now())
    }

    fn acquire(&self) -> Result<(), LlmError> {
        self.limiter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .try_acquire(Instant::now())
            .map_err(|retry_after_secs| {
                tracing::warn!(retry_after_secs, "anthropic rate limit reached locally");
                LlmError::RateLimited { retry_after_secs }
            })
    }

    /// One Messages API call. The configured system prompt is always sent.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        self.acquire()?;

        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "system": self.system_prompt,
            "messages": to_api_messages(messages),
        });
        let url = format!("{}/v1/messages", self.base_url);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let raw = response.text().await.unwrap_or_default();
            let err = translate_status(status, retry_after, &raw);
            tracing::error!(status = status.as_u16(), error = %err, "anthropic request failed");
            return Err(err);
        }

        let raw = response.text().await?;
        let parsed: MessagesResponse = serde_json::from_str(&raw)
            .map_err(|e| LlmError::InvalidResponse(format!("bad messages response: {e}")))?;
        Ok(parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    /// One-sentence summary of the last six messages, at most 150 chars.
    /// `None` when the call fails.
    pub async fn generate_summary(&self, conversation: &[ChatMessage]) -> Option<String> {
        if conversation.is_empty() {
            return None;
        }
        let prompt = format!("{SUMMARY_PROMPT}{}", transcript(conversation, 6, 200));
        match self.complete(&[ChatMessage::user(prompt)], 100, 0.5).await {
            Ok(text) => {
                let summary: String = text.trim().chars().take(MAX_SUMMARY_CHARS).collect();
                (!summary.is_empty()).then_some(summary)
            }
            Err(e) => {
                tracing::warn!(error = %e, "summary generation failed");
                None
            }
        }
    }

    /// Up to three bullet-point insights from the last eight messages.
    pub async fn extract_key_insights(&self, conversation: &[ChatMessage]) -> Vec<String> {
        if conversation.is_empty() {
            return Vec::new();
        }
        let prompt = format!("{INSIGHTS_PROMPT}{}", transcript(conversation, 8, 300));
        match self.complete(&[ChatMessage::user(prompt)], 300, 0.5).await {
            Ok(text) => parse_bullets(&text),
            Err(e) => {
                tracing::warn!(error = %e, "insight extraction failed");
                Vec::new()
            }
        }
    }

    /// Mood, energy, topics, goals, and challenges of the last ten messages.
    /// An unparsable reply yields [`PatternAnalysis::default`].
    pub async fn analyze_patterns(
        &self,
        conversation: &[ChatMessage],
    ) -> Result<PatternAnalysis, LlmError> {
        let prompt = format!(
            "{ANALYSIS_PROMPT}\n\nConversation:\n{}",
            transcript(conversation, 10, usize::MAX)
        );
        let text = self
            .complete(&[ChatMessage::user(prompt)], 500, 0.3)
            .await?;
        Ok(serde_json::from_str(text.trim()).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "pattern analysis reply was not JSON, using defaults");
            PatternAnalysis::default()
        }))
    }
}

#[async_trait]
impl LlmBackend for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, messages = messages.len(), "anthropic generate");
        self.complete(messages, DEFAULT_MAX_TOKENS, 0.7).await
    }

    async fn check_health(&self) -> bool {
        let body = json!({
            "model": self.model,
            "max_tokens": 10,
            "messages": [{"role": "user", "content": "test"}],
        });
        let url = format!("{}/v1/messages", self.base_url);
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::error!(error = %e, "anthropic health check failed");
                false
            }
        }
    }
}

/// The API only accepts user and assistant turns.
fn to_api_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "assistant",
                Role::User | Role::System => "user",
            };
            json!({"role": role, "content": m.content})
        })
        .collect()
}

fn transcript(messages: &[ChatMessage], last: usize, max_chars: usize) -> String {
    let start = messages.len().saturating_sub(last);
    messages[start..]
        .iter()
        .map(|m| {
            let content: String = m.content.chars().take(max_chars).collect();
            format!("{}: {content}", m.role)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_bullets(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .map(str::to_string)
        })
        .take(MAX_INSIGHTS)
        .collect()
}

fn translate_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> LlmError {
    match status.as_u16() {
        401 => LlmError::Unauthorized,
        429 => LlmError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        code if code >= 500 => LlmError::Unavailable(format!("status {code}")),
        code => LlmError::InvalidResponse(format!("status {code}: {}", body.trim())),
    }
}
