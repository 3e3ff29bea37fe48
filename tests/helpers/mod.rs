#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use vaultmate::app::AppContext;
use vaultmate::commands::{CommandDefinition, CommandRegistry};
use vaultmate::config::AppConfig;
use vaultmate::llm::{ChatMessage, LlmBackend, LlmError};
use vaultmate::scheduler::nudge::Messenger;
use vaultmate::vault::Vault;

pub const OWNER_CHAT_ID: i64 = 42;

/// A vault directory with a few notes in nested folders.
pub fn test_vault() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_note(
        dir.path(),
        "Inbox.md",
        "# Inbox\n\n- buy milk\n- call the plumber\n",
    );
    write_note(
        dir.path(),
        "Areas/Health.md",
        "# Health\n\nRunning three times a week.\nTrack sleep and milk intake.\n",
    );
    write_note(
        dir.path(),
        "Daily-Notes/2024-03-05.md",
        "# 2024-03-05\n\nWorked on the vault plugin.\n",
    );
    dir
}

pub fn write_note(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn sample_commands() -> CommandRegistry {
    CommandRegistry::from_definitions([
        CommandDefinition {
            name: "search".to_string(),
            description: "Search the vault".to_string(),
            syntax: "/search <query>".to_string(),
            examples: vec!["/search milk".to_string()],
        },
        CommandDefinition {
            name: "summarize".to_string(),
            description: "Summarize a note".to_string(),
            syntax: "/summarize <path>".to_string(),
            examples: Vec::new(),
        },
    ])
}

/// Backend that answers with a fixed reply and records every call.
pub struct FakeBackend {
    pub reply: Result<String, String>,
    pub healthy: bool,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeBackend {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            healthy: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(reason.to_string()),
            healthy: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(reason) => Err(LlmError::Unavailable(reason.clone())),
        }
    }

    async fn check_health(&self) -> bool {
        self.healthy
    }
}

/// Messenger that keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingMessenger {
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

pub fn test_config(vault_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.vault.path = vault_dir.display().to_string();
    config.telegram.chat_id = Some(OWNER_CHAT_ID);
    config
}

/// Context over `vault_dir` with no hosted client and no Telegram client.
pub fn test_context(vault_dir: &Path, llm: Arc<dyn LlmBackend>) -> Arc<AppContext> {
    let config = test_config(vault_dir);
    let vault = Arc::new(Vault::new(vault_dir));
    Arc::new(AppContext::new(
        config,
        vault,
        sample_commands(),
        llm,
        None,
        None,
    ))
}
