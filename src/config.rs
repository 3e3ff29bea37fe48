use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Upper bound for the per-kind nudge cooldown: one day.
const MAX_COOLDOWN_MINUTES: i64 = 24 * 60;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub vault: VaultConfig,
    pub llm: LlmConfig,
    pub telegram: TelegramConfig,
    pub nudging: NudgingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VaultConfig {
    pub path: String,
    pub commands_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// `"ollama"` (local model server) or `"anthropic"` (hosted API).
    pub backend: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub worker_threads: usize,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: String,
    pub max_requests_per_minute: usize,
    pub request_timeout_secs: u64,
    pub system_prompt: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<i64>,
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NudgingConfig {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
    pub max_per_day: usize,
    pub same_type_cooldown_minutes: i64,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a personal AI assistant focused on productivity, \
self-improvement, and knowledge management.

You have access to the user's Obsidian vault with their personal notes, goals, habit tracking, \
and journal entries.

Key capabilities:
- Personal task and todo management
- Goal tracking and progress monitoring
- Habit tracking and streak monitoring
- Self-reflection and journaling prompts
- Search personal knowledge base
- Proactive nudges and reminders

Be supportive, encouraging, and help the user stay aligned with their personal goals and \
self-improvement journey. Keep responses concise but helpful.";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
            cors_origins: vec![
                "http://localhost:3000".into(),
                "http://localhost:5173".into(),
                "http://localhost:5174".into(),
            ],
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: "~/obsidian-vault".into(),
            commands_dir: default_vaultmate_dir()
                .join("commands")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".into(),
            ollama_url: "http://localhost:11434".into(),
            ollama_model: "qwen2.5-coder:7b".into(),
            worker_threads: 4,
            anthropic_api_key: None,
            anthropic_model: "claude-3-haiku-20240307".into(),
            anthropic_base_url: "https://api.anthropic.com".into(),
            max_requests_per_minute: 50,
            request_timeout_secs: 120,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".into(),
            poll_timeout_secs: 30,
        }
    }
}

impl Default for NudgingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hour: 8,
            end_hour: 22,
            max_per_day: 5,
            same_type_cooldown_minutes: 120,
        }
    }
}

/// Returns `~/.vaultmate/`
pub fn default_vaultmate_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vaultmate")
}

/// Returns the default config file path: `~/.vaultmate/config.toml`
pub fn default_config_path() -> PathBuf {
    default_vaultmate_dir().join("config.toml")
}

impl AppConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides for secrets and deployment paths.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("OBSIDIAN_VAULT_PATH") {
            self.vault.path = val;
        }
        if let Ok(val) = std::env::var("VAULTMATE_COMMANDS_DIR") {
            self.vault.commands_dir = val;
        }
        if let Ok(val) = std::env::var("VAULTMATE_LLM_BACKEND") {
            self.llm.backend = val;
        }
        if let Ok(val) = std::env::var("OLLAMA_HOST") {
            self.llm.ollama_url = val;
        }
        if let Ok(val) = std::env::var("OLLAMA_MODEL") {
            self.llm.ollama_model = val;
        }
        if let Ok(val) = std::env::var("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(val);
        }
        if let Ok(val) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(val);
        }
        if let Ok(val) = std::env::var("TELEGRAM_CHAT_ID") {
            match val.trim().parse() {
                Ok(id) => self.telegram.chat_id = Some(id),
                Err(_) => tracing::warn!(value = %val, "ignoring non-numeric TELEGRAM_CHAT_ID"),
            }
        }
        if let Ok(val) = std::env::var("VAULTMATE_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.nudging.start_hour < 24 && self.nudging.end_hour <= 24,
            "nudging hours must be within 0..=24"
        );
        anyhow::ensure!(
            self.nudging.start_hour < self.nudging.end_hour,
            "nudging.start_hour must be before nudging.end_hour"
        );
        anyhow::ensure!(
            (0..=MAX_COOLDOWN_MINUTES).contains(&self.nudging.same_type_cooldown_minutes),
            "nudging.same_type_cooldown_minutes must be within 0..={MAX_COOLDOWN_MINUTES}"
        );
        anyhow::ensure!(self.llm.worker_threads > 0, "llm.worker_threads must be > 0");
        Ok(())
    }

    /// Resolve the vault root, expanding `~` if needed.
    pub fn resolved_vault_path(&self) -> PathBuf {
        expand_tilde(&self.vault.path)
    }

    pub fn resolved_commands_dir(&self) -> PathBuf {
        expand_tilde(&self.vault.commands_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.llm.backend, "ollama");
        assert_eq!(config.nudging.start_hour, 8);
        assert_eq!(config.nudging.end_hour, 22);
        assert_eq!(config.nudging.max_per_day, 5);
        assert_eq!(config.llm.max_requests_per_minute, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 9000

[vault]
path = "/tmp/vault"

[nudging]
max_per_day = 3
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.vault.path, "/tmp/vault");
        assert_eq!(config.nudging.max_per_day, 3);
        // defaults still apply for unset fields
        assert_eq!(config.nudging.end_hour, 22);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn inverted_active_window_is_rejected() {
        let mut config = AppConfig::default();
        config.nudging.start_hour = 22;
        config.nudging.end_hour = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cooldown_outside_one_day_is_rejected() {
        let mut config = AppConfig::default();
        config.nudging.same_type_cooldown_minutes = -1;
        assert!(config.validate().is_err());
        config.nudging.same_type_cooldown_minutes = i64::MAX;
        assert!(config.validate().is_err());
        config.nudging.same_type_cooldown_minutes = 24 * 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        std::env::set_var("OBSIDIAN_VAULT_PATH", "/tmp/override-vault");
        std::env::set_var("TELEGRAM_CHAT_ID", "12345");
        std::env::set_var("VAULTMATE_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.vault.path, "/tmp/override-vault");
        assert_eq!(config.telegram.chat_id, Some(12345));
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("OBSIDIAN_VAULT_PATH");
        std::env::remove_var("TELEGRAM_CHAT_ID");
        std::env::remove_var("VAULTMATE_LOG_LEVEL");
    }
}
