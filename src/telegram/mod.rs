//! Telegram Bot API client and long-poll loop.
//!
//! The client talks to `<api_base>/bot<token>/<method>` with reqwest. Updates
//! are fetched with `getUpdates` long polling and handed to
//! [`handlers::BotHandlers`] one at a time.

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::config::TelegramConfig;
use crate::scheduler::nudge::Messenger;
use handlers::BotHandlers;

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    endpoint: String,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, poll_timeout_secs: u64) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            bail!("telegram bot token is empty");
        }
        let base = api_base.trim().trim_end_matches('/');
        // Requests must outlive the long-poll window.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 15))
            .build()
            .context("failed to build telegram HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{base}/bot{token}"),
            poll_timeout_secs,
        })
    }

    /// `None` when no bot token is configured.
    pub fn from_config(config: &TelegramConfig) -> Result<Option<Self>> {
        match config.bot_token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => Self::new(&config.api_base, token, config.poll_timeout_secs).map(Some),
            None => Ok(None),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.endpoint)
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let response = self
            .client
            .get(format!(
                "{}?offset={offset}&timeout={timeout_secs}",
                self.method_url("getUpdates")
            ))
            .send()
            .await
            .context("telegram getUpdates request failed")?;
        let body = parse_api_response(response, "getUpdates").await?;
        let result = body
            .get("result")
            .cloned()
            .ok_or_else(|| anyhow!("telegram getUpdates response missing result[]"))?;
        serde_json::from_value(result).context("failed to decode telegram updates")
    }

    pub async fn send_message(&self, chat_id: i64, text: &str, parse_mode: Option<&str>) -> Result<()> {
        let mut payload = json!({"chat_id": chat_id, "text": text});
        if let Some(mode) = parse_mode {
            payload["parse_mode"] = json!(mode);
        }
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .context("telegram sendMessage request failed")?;
        parse_api_response(response, "sendMessage").await?;
        Ok(())
    }
}

async fn parse_api_response(response: reqwest::Response, method: &str) -> Result<Value> {
    let status = response.status();
    let raw = response
        .text()
        .await
        .with_context(|| format!("failed to read telegram {method} response"))?;
    let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
    let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if !status.is_success() || !ok {
        let description = body
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or(raw.as_str());
        bail!("telegram {method} failed with {}: {description}", status.as_u16());
    }
    Ok(body)
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text, Some("Markdown")).await
    }

    async fn send_plain(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text, None).await
    }
}

/// Long-poll until `shutdown` carries `true`. Failures of a single update
/// are logged and the loop moves on.
pub async fn run_polling(
    client: Arc<TelegramClient>,
    handlers: Arc<BotHandlers>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("telegram polling started");
    let mut offset = 0_i64;
    loop {
        if *shutdown.borrow() {
            break;
        }
        let poll = client.get_updates(offset, client.poll_timeout_secs);
        let updates = tokio::select! {
            result = poll => result,
            _ = shutdown.changed() => break,
        };

        match updates {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let update_id = update.update_id;
                    if let Err(e) = handlers.handle_update(update, client.as_ref()).await {
                        tracing::error!(update_id, error = %e, "failed to handle telegram update");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "telegram poll failed");
                tokio::select! {
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }
    tracing::info!("telegram polling stopped");
}
