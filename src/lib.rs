//! Personal productivity assistant over a markdown note vault.
//!
//! vaultmate answers chat messages through a local or hosted LLM, exposes
//! the vault over HTTP and a Telegram bot, keeps project and goal records
//! up to date, saves conversations back into the vault, and sends
//! throttled reminders on a schedule.
//!
//! # Architecture
//!
//! - **Vault**: plain markdown files with YAML frontmatter; every path is
//!   checked against the configured roots before any I/O
//! - **LLM**: Ollama (blocking calls on a bounded worker pool) or the
//!   Anthropic Messages API, behind one [`llm::LlmBackend`] trait
//! - **Surfaces**: an axum HTTP API, a long-polling Telegram bot, and the CLI
//! - **Scheduler**: cron-driven nudges gated by a daily cap, active hours,
//!   and a per-kind cooldown
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`error`]: Tagged result type shared by the domain layers
//! - [`vault`]: File access, frontmatter, metadata extraction, projects, transcripts
//! - [`commands`]: Slash-command registry, parser, and executor
//! - [`llm`]: Chat backends, worker pool, and rate limiter
//! - [`conversation`]: Per-user message buffers and auto-save policy
//! - [`scheduler`]: Periodic runner and the nudging service
//! - [`telegram`]: Bot API client and command handlers
//! - [`server`]: HTTP routes
//! - [`app`]: Service wiring shared by every surface
//! - [`cli`]: Terminal subcommands

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod scheduler;
pub mod server;
pub mod telegram;
pub mod vault;
