//! Local model server speaking the Ollama chat API.
//!
//! Generation uses a blocking HTTP client run on the [`BlockingPool`], so a
//! slow local model never stalls the async runtime. Streaming replies are
//! read line by line (newline-delimited JSON) on the worker and forwarded
//! through a channel.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::pool::BlockingPool;
use super::{ChatMessage, LlmBackend, LlmError, Role, TextStream};
use crate::config::LlmConfig;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const STREAM_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    system_prompt: String,
    timeout: Duration,
    pool: BlockingPool,
    health_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.ollama_model.clone(),
            system_prompt: config.system_prompt.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
            pool: BlockingPool::new(config.worker_threads),
            health_client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn pool(&self) -> &BlockingPool {
        &self.pool
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> serde_json::Value {
        let mut payload: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);
        let has_system = messages.first().is_some_and(|m| m.role == Role::System);
        if !has_system && !self.system_prompt.is_empty() {
            payload.push(json!({"role": "system", "content": self.system_prompt}));
        }
        payload.extend(
            messages
                .iter()
                .map(|m| json!({"role": m.role.as_str(), "content": m.content})),
        );
        json!({
            "model": self.model,
            "messages": payload,
            "stream": stream,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

// The blocking client owns an internal runtime, so it is created and dropped
// on the worker thread rather than stored in the async-side struct.
fn blocking_client(timeout: Duration) -> Result<reqwest::blocking::Client, LlmError> {
    Ok(reqwest::blocking::Client::builder().timeout(timeout).build()?)
}

fn post_chat(
    url: &str,
    body: &serde_json::Value,
    timeout: Duration,
) -> Result<reqwest::blocking::Response, LlmError> {
    let response = blocking_client(timeout)?.post(url).json(body).send()?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().unwrap_or_default();
    Err(LlmError::Unavailable(format!(
        "ollama returned {}: {}",
        status.as_u16(),
        detail.trim()
    )))
}

fn chunk_text(line: &str) -> Result<Option<(String, bool)>, LlmError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| LlmError::InvalidResponse(format!("bad chunk from ollama: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(LlmError::Unavailable(error));
    }
    let text = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok(Some((text, chunk.done)))
}

#[async_trait]
impl LlmBackend for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = self.chat_url();
        let body = self.request_body(messages, false);
        let timeout = self.timeout;
        tracing::debug!(model = %self.model, messages = messages.len(), "ollama generate");

        self.pool
            .run(move || {
                let response = post_chat(&url, &body, timeout)?;
                let raw = response.text()?;
                match chunk_text(&raw)? {
                    Some((text, _)) => Ok(text),
                    None => Err(LlmError::InvalidResponse("empty reply from ollama".into())),
                }
            })
            .await?
    }

    async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TextStream, LlmError> {
        let url = self.chat_url();
        let body = self.request_body(messages, true);
        let timeout = self.timeout;
        let pool = self.pool.clone();
        let (tx, rx) = mpsc::channel::<Result<String, LlmError>>(STREAM_BUFFER);

        tokio::spawn(async move {
            let worker_tx = tx.clone();
            let outcome = pool
                .run(move || {
                    let response = match post_chat(&url, &body, timeout) {
                        Ok(r) => r,
                        Err(e) => {
                            let _ = worker_tx.blocking_send(Err(e));
                            return;
                        }
                    };
                    for line in BufReader::new(response).lines() {
                        let item = match line {
                            Ok(line) => match chunk_text(&line) {
                                Ok(Some((text, done))) => {
                                    if !text.is_empty() && worker_tx.blocking_send(Ok(text)).is_err() {
                                        return;
                                    }
                                    if done {
                                        return;
                                    }
                                    continue;
                                }
                                Ok(None) => continue,
                                Err(e) => Err(e),
                            },
                            Err(e) => Err(LlmError::Worker(format!("stream read failed: {e}"))),
                        };
                        let _ = worker_tx.blocking_send(item);
                        return;
                    }
                })
                .await;
            if let Err(e) = outcome {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .health_client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "ollama health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OllamaClient {
        OllamaClient::new(&LlmConfig {
            system_prompt: "be brief".into(),
            ..LlmConfig::default()
        })
    }

    #[test]
    fn system_prompt_is_prepended() {
        let body = client().request_body(&[ChatMessage::user("hi")], false);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be brief");
        assert_eq!(messages[1]["content"], "hi");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn explicit_system_message_wins() {
        let body = client().request_body(
            &[ChatMessage::system("custom"), ChatMessage::user("hi")],
            true,
        );
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"], "custom");
    }

    #[test]
    fn chunk_parsing() {
        let line = r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#;
        assert_eq!(chunk_text(line).unwrap(), Some(("Hel".to_string(), false)));
        assert_eq!(chunk_text("  ").unwrap(), None);
        assert!(matches!(
            chunk_text(r#"{"error":"model not found"}"#),
            Err(LlmError::Unavailable(_))
        ));
        assert!(matches!(
            chunk_text("not json"),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
