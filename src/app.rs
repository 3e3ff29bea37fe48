//! Process-wide services, built once at startup.
//!
//! [`AppContext`] is handed to the HTTP routes, the Telegram handlers, the
//! nudging jobs, and the CLI. Nothing in the crate reaches for a global.

use std::sync::Arc;

use anyhow::Result;

use crate::commands::CommandRegistry;
use crate::config::AppConfig;
use crate::conversation::ConversationContext;
use crate::error::{OpError, OpResult};
use crate::llm::anthropic::AnthropicClient;
use crate::llm::{create_backend, ChatMessage, LlmBackend};
use crate::scheduler::nudge::{Messenger, NudgingService};
use crate::telegram::TelegramClient;
use crate::vault::conversations::SaveRequest;
use crate::vault::Vault;

pub struct AppContext {
    pub config: AppConfig,
    pub vault: Arc<Vault>,
    pub commands: CommandRegistry,
    /// Backend that answers chat messages.
    pub llm: Arc<dyn LlmBackend>,
    /// Hosted client used for conversation summaries when a key is set.
    pub summarizer: Option<Arc<AnthropicClient>>,
    pub telegram: Option<Arc<TelegramClient>>,
    pub nudging: Arc<NudgingService>,
}

impl AppContext {
    /// Wire every service from configuration.
    pub fn build(config: AppConfig) -> Result<Arc<Self>> {
        let vault = Arc::new(Vault::new(config.resolved_vault_path()));
        if !vault.exists() {
            tracing::warn!(vault = %vault.root().display(), "vault directory does not exist");
        }
        let commands = CommandRegistry::load(config.resolved_commands_dir());
        tracing::info!(count = commands.len(), "commands loaded");

        let summarizer = AnthropicClient::from_config(&config.llm)?.map(Arc::new);
        let llm: Arc<dyn LlmBackend> = match (&summarizer, config.llm.backend.as_str()) {
            (Some(client), "anthropic") => client.clone() as Arc<dyn LlmBackend>,
            _ => create_backend(&config.llm)?,
        };
        tracing::info!(backend = llm.name(), "LLM backend selected");

        let telegram = TelegramClient::from_config(&config.telegram)?.map(Arc::new);
        Ok(Arc::new(Self::new(
            config, vault, commands, llm, summarizer, telegram,
        )))
    }

    pub fn new(
        config: AppConfig,
        vault: Arc<Vault>,
        commands: CommandRegistry,
        llm: Arc<dyn LlmBackend>,
        summarizer: Option<Arc<AnthropicClient>>,
        telegram: Option<Arc<TelegramClient>>,
    ) -> Self {
        let messenger = telegram.clone().map(|t| t as Arc<dyn Messenger>);
        let nudging = Arc::new(NudgingService::new(
            &config.nudging,
            messenger,
            vault.clone(),
            config.telegram.chat_id,
        ));
        Self {
            config,
            vault,
            commands,
            llm,
            summarizer,
            telegram,
            nudging,
        }
    }

    /// Generate a chat reply, translating backend failures into user-facing errors.
    pub async fn reply(&self, messages: &[ChatMessage]) -> OpResult<String> {
        self.llm.generate(messages).await.map_err(|e| {
            tracing::warn!(backend = self.llm.name(), error = %e, "generation failed");
            OpError::from(e)
        })
    }

    /// Summarise (when a hosted client is available) and write a transcript
    /// to the vault, rewriting `existing` when given. Returns the
    /// vault-relative path.
    pub async fn save_conversation(
        &self,
        messages: Vec<ChatMessage>,
        topic: Option<String>,
        context: Option<ConversationContext>,
        platform: &str,
        existing: Option<String>,
    ) -> OpResult<String> {
        if messages.is_empty() {
            return Err(OpError::validation("No messages to save"));
        }

        let (summary, key_insights) = match &self.summarizer {
            Some(client) => (
                client.generate_summary(&messages).await,
                client.extract_key_insights(&messages).await,
            ),
            None => (None, Vec::new()),
        };

        let request = SaveRequest {
            messages,
            topic: topic.unwrap_or_default(),
            context,
            platform: platform.to_string(),
            summary,
            key_insights,
            existing,
        };
        let vault = self.vault.clone();
        tokio::task::spawn_blocking(move || vault.conversations().save_conversation(&request))
            .await
            .map_err(|e| OpError::io(format!("save task failed: {e}")))?
    }
}
