//! Bot commands and free-text chat.
//!
//! Only authorized users are served: the configured chat id is authorized at
//! startup and `/start` authorizes whoever sends it. Every other command
//! answers "Please /start first." to strangers.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tokio::sync::Mutex;

use super::Update;
use crate::app::AppContext;
use crate::conversation::{ConversationContext, ConversationManager};
use crate::error::ErrorKind;
use crate::llm::Role;
use crate::scheduler::nudge::Messenger;
use crate::vault::conversations::DAILY_NOTES_FOLDER;
use crate::vault::projects::{Priority, RecordKind};

const NOT_AUTHORIZED: &str = "Please /start first.";
const SEARCH_LIMIT: usize = 5;
const MAX_EXCERPT_CHARS: usize = 100;
const MAX_DAILY_NOTE_CHARS: usize = 3000;
const PLATFORM: &str = "telegram";

const HELP_TEXT: &str = "**Available Commands:**

**Conversation:**
/new - Save and start a fresh conversation
/context - Show current conversation state
/clear - Clear conversation context

**Knowledge Base:**
/search <query> - Search your Obsidian vault
/today - View today's daily note

**Projects & Goals:**
/project <name> - Create or switch to a project
/goal <name> - Create or switch to a goal
/progress <0-100> - Update progress percentage

**System:**
/status - Show system status
/help - Show this message

Just send a regular message to chat with AI!";

/// A reply and whether it is Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
    pub text: String,
    pub markdown: bool,
}

impl BotReply {
    fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: true,
        }
    }

    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
        }
    }
}

pub struct BotHandlers {
    ctx: Arc<AppContext>,
    authorized: Mutex<HashSet<i64>>,
    conversations: Mutex<ConversationManager>,
}

impl BotHandlers {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let authorized: HashSet<i64> = ctx.config.telegram.chat_id.into_iter().collect();
        Self {
            ctx,
            authorized: Mutex::new(authorized),
            conversations: Mutex::new(ConversationManager::new()),
        }
    }

    pub async fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized.lock().await.contains(&user_id)
    }

    /// Dispatch one update and send the reply through `out`.
    pub async fn handle_update(&self, update: Update, out: &dyn Messenger) -> Result<()> {
        let Some(message) = update.message else {
            return Ok(());
        };
        let (Some(text), Some(user)) = (message.text, message.from) else {
            return Ok(());
        };
        let chat_id = message.chat.id;

        if text.trim_start().starts_with('/') {
            if let Some(reply) = self
                .handle_command(user.id, user.username.as_deref(), &text)
                .await
            {
                send(out, chat_id, &reply).await?;
            }
            return Ok(());
        }

        let reply = self.handle_message(user.id, &text).await;
        send(out, chat_id, &reply).await?;
        self.auto_save_if_due(user.id).await;
        Ok(())
    }

    /// `None` for commands the bot does not know.
    pub async fn handle_command(
        &self,
        user_id: i64,
        username: Option<&str>,
        text: &str,
    ) -> Option<BotReply> {
        let (name, args) = split_command(text);
        if name == "start" {
            return Some(self.cmd_start(user_id, username).await);
        }
        let known = matches!(
            name.as_str(),
            "help" | "search" | "today" | "project" | "goal" | "new" | "context" | "progress"
                | "clear" | "status"
        );
        if !known {
            tracing::debug!(command = %name, "ignoring unknown telegram command");
            return None;
        }
        if !self.is_authorized(user_id).await {
            return Some(BotReply::plain(NOT_AUTHORIZED));
        }

        let reply = match name.as_str() {
            "help" => BotReply::markdown(HELP_TEXT),
            "search" => self.cmd_search(&args),
            "today" => self.cmd_today(),
            "project" => self.cmd_set_context(user_id, RecordKind::Project, &args).await,
            "goal" => self.cmd_set_context(user_id, RecordKind::Goal, &args).await,
            "new" => self.cmd_new(user_id).await,
            "context" => self.cmd_context(user_id).await,
            "progress" => self.cmd_progress(user_id, &args).await,
            "clear" => self.cmd_clear(user_id).await,
            _ => self.cmd_status().await,
        };
        Some(reply)
    }

    async fn cmd_start(&self, user_id: i64, username: Option<&str>) -> BotReply {
        self.authorized.lock().await.insert(user_id);
        tracing::info!(user_id, "user authorized via /start");
        let name = username.unwrap_or("there");
        BotReply::markdown(format!(
            "Welcome, {name}!\n\n\
             I'm your personal AI assistant with access to your Obsidian vault.\n\n\
             **Getting Started:**\n\
             - Just send me a message to start chatting\n\
             - Use /help to see all commands\n\
             - Use /search <query> to search your vault\n\
             - Use /project or /goal to set conversation context\n\n\
             I'll help you stay productive and aligned with your goals!"
        ))
    }

    fn cmd_search(&self, query: &str) -> BotReply {
        if query.is_empty() {
            return BotReply::plain("Usage: /search <query>");
        }
        let found = match self.ctx.vault.search_vault(query, SEARCH_LIMIT) {
            Ok(found) => found,
            Err(e) => return BotReply::plain(format!("Search error: {}", e.message)),
        };
        if found.results.is_empty() {
            return BotReply::plain(format!("No results found for: {query}"));
        }

        let mut text = format!("**Search results for '{query}':**\n\n");
        for (i, hit) in found.results.iter().enumerate() {
            let excerpt = if hit.excerpt.chars().count() > MAX_EXCERPT_CHARS {
                format!(
                    "{}...",
                    hit.excerpt.chars().take(MAX_EXCERPT_CHARS).collect::<String>()
                )
            } else {
                hit.excerpt.clone()
            };
            text.push_str(&format!("{}. **{}**\n   {excerpt}\n\n", i + 1, hit.file));
        }
        BotReply::markdown(text)
    }

    fn cmd_today(&self) -> BotReply {
        let today = Local::now().format("%Y-%m-%d").to_string();
        let note_path = format!("{DAILY_NOTES_FOLDER}/{today}.md");
        let content = match self.ctx.vault.read_note(&note_path) {
            Ok(content) => content,
            Err(_) => {
                return BotReply::markdown(format!(
                    "No daily note for today yet.\nCreate one at: `{note_path}`"
                ))
            }
        };
        let content = if content.chars().count() > MAX_DAILY_NOTE_CHARS {
            format!(
                "{}\n\n...(truncated)",
                content.chars().take(MAX_DAILY_NOTE_CHARS).collect::<String>()
            )
        } else {
            content
        };
        BotReply::markdown(format!("**Daily Note - {today}**\n\n{content}"))
    }

    /// Switch the conversation to a project or goal, creating the record
    /// when it does not exist yet.
    async fn cmd_set_context(&self, user_id: i64, kind: RecordKind, name: &str) -> BotReply {
        let label = kind.as_str();
        if name.is_empty() {
            let example = match kind {
                RecordKind::Project => "Website Redesign",
                RecordKind::Goal => "Learn Japanese N3",
            };
            return BotReply::plain(format!(
                "Usage: /{label} <name>\n\nExample: /{label} {example}"
            ));
        }

        let projects = self.ctx.vault.projects();
        let mut created = false;
        if let Err(e) = projects.read_project(name) {
            if e.kind != ErrorKind::NotFound {
                return BotReply::plain(format!("Could not open {label}: {}", e.message));
            }
            let result = match kind {
                RecordKind::Project => projects.create_project(name, "", Priority::Medium),
                RecordKind::Goal => projects.create_goal(name, "", None, false),
            };
            match result {
                Ok(_) => created = true,
                Err(e) => return BotReply::plain(format!("Could not create {label}: {}", e.message)),
            }
        }

        self.conversations.lock().await.get_mut(user_id).context = Some(ConversationContext {
            kind,
            name: name.to_string(),
        });

        let title = capitalize(label);
        let mut text = format!("{title} context set to: **{name}**\n\n");
        if created {
            text.push_str(&format!("Created a new {label} in your vault.\n"));
        }
        text.push_str(&format!("All messages will be linked to this {label}."));
        BotReply::markdown(text)
    }

    /// Save anything not yet written, then start over.
    async fn cmd_new(&self, user_id: i64) -> BotReply {
        let previous = self.conversations.lock().await.reset(user_id);
        let Some(previous) = previous.filter(|s| s.has_unsaved()) else {
            return BotReply::plain("Started a new conversation.");
        };

        match self
            .ctx
            .save_conversation(
                previous.messages,
                previous.topic,
                previous.context,
                PLATFORM,
                previous.saved_path,
            )
            .await
        {
            Ok(path) => {
                tracing::info!(user_id, path = %path, "saved conversation before reset");
                BotReply::plain(
                    "Started a new conversation.\n\nPrevious conversation saved to Obsidian.",
                )
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "failed to save conversation before reset");
                BotReply::plain(format!(
                    "Started a new conversation.\n\nCould not save the previous one: {}",
                    e.message
                ))
            }
        }
    }

    async fn cmd_context(&self, user_id: i64) -> BotReply {
        let mut conversations = self.conversations.lock().await;
        let state = conversations.get_mut(user_id);
        let minutes = (Local::now() - state.start_time).num_minutes();
        let topic = state.topic.as_deref().unwrap_or("(auto-detected)");

        let mut text = format!(
            "**Current Conversation Context:**\n\nMessages: {}\nDuration: {minutes} minutes\nTopic: {topic}\n",
            state.messages.len()
        );
        match &state.context {
            Some(ctx) => text.push_str(&format!("\n{}: {}", capitalize(ctx.kind.as_str()), ctx.name)),
            None => text.push_str("\nNo project/goal context set."),
        }
        BotReply::markdown(text)
    }

    async fn cmd_progress(&self, user_id: i64, args: &str) -> BotReply {
        let context = self.conversations.lock().await.get_mut(user_id).context.clone();
        let Some(context) = context else {
            return BotReply::plain("No project or goal context set.\nUse /project or /goal first.");
        };
        let Some(first) = args.split_whitespace().next() else {
            return BotReply::plain("Usage: /progress <0-100>");
        };
        let progress = match first.parse::<i64>() {
            Ok(p) if (0..=100).contains(&p) => p,
            _ => return BotReply::plain("Progress must be a number from 0 to 100."),
        };

        let notes = format!("Updated via Telegram to {progress}%");
        match self
            .ctx
            .vault
            .projects()
            .update_progress(&context.name, progress, &notes)
        {
            Ok(()) => BotReply::plain(format!(
                "Updated {} '{}' to {progress}% complete.",
                context.kind.as_str(),
                context.name
            )),
            Err(e) => BotReply::plain(format!("Could not update progress: {}", e.message)),
        }
    }

    async fn cmd_clear(&self, user_id: i64) -> BotReply {
        let mut conversations = self.conversations.lock().await;
        let state = conversations.get_mut(user_id);
        state.context = None;
        state.topic = None;
        BotReply::plain("Conversation context cleared.")
    }

    async fn cmd_status(&self) -> BotReply {
        let mut lines = vec![
            "**System Status:**\n".to_string(),
            "Telegram Bot: Online".to_string(),
        ];

        let backend = self.ctx.llm.name();
        let healthy = self.ctx.llm.check_health().await;
        lines.push(format!(
            "{}: {}",
            capitalize(backend),
            if healthy { "Online" } else { "Offline" }
        ));

        match &self.ctx.summarizer {
            Some(client) => lines.push(format!(
                "Summaries: Anthropic ({} req remaining)",
                client.rate_limit_status().remaining
            )),
            None => lines.push("Summaries: Not configured".to_string()),
        }
        lines.push(format!("Vault: {}", self.ctx.vault.root().display()));

        let nudges = self.ctx.nudging.status(Local::now()).await;
        if nudges.enabled {
            lines.push(format!(
                "Nudging: {}/{} today ({})",
                nudges.nudges_sent_today, nudges.max_per_day, nudges.active_hours
            ));
        } else {
            lines.push("Nudging: Disabled".to_string());
        }
        lines.push(format!("\nActive LLM: {}", capitalize(backend)));
        BotReply::markdown(lines.join("\n"))
    }

    /// Free-text chat: buffer the message, ask the backend, buffer the reply.
    pub async fn handle_message(&self, user_id: i64, text: &str) -> BotReply {
        if !self.is_authorized(user_id).await {
            return BotReply::plain(NOT_AUTHORIZED);
        }

        let history = {
            let mut conversations = self.conversations.lock().await;
            let state = conversations.get_mut(user_id);
            state.push(Role::User, text);
            state.messages.clone()
        };

        match self.ctx.reply(&history).await {
            Ok(reply) => {
                self.conversations
                    .lock()
                    .await
                    .push(user_id, Role::Assistant, reply.clone());
                BotReply::plain(reply)
            }
            Err(e) => BotReply::plain(e.message),
        }
    }

    /// Save the buffer when the auto-save policy says so.
    pub async fn auto_save_if_due(&self, user_id: i64) {
        let now = Local::now();
        let snapshot = {
            let conversations = self.conversations.lock().await;
            if !conversations.should_auto_save(user_id, now) {
                return;
            }
            conversations.get(user_id).map(|s| {
                (
                    s.messages.clone(),
                    s.topic.clone(),
                    s.context.clone(),
                    s.saved_path.clone(),
                )
            })
        };
        let Some((messages, topic, context, existing)) = snapshot else {
            return;
        };

        match self
            .ctx
            .save_conversation(messages, topic, context, PLATFORM, existing)
            .await
        {
            Ok(path) => {
                tracing::info!(user_id, path = %path, "auto-saved conversation");
                self.conversations.lock().await.mark_saved(user_id, now, path);
            }
            Err(e) => tracing::error!(user_id, error = %e, "auto-save failed"),
        }
    }

    pub async fn message_count(&self, user_id: i64) -> usize {
        self.conversations
            .lock()
            .await
            .get(user_id)
            .map(|s| s.messages.len())
            .unwrap_or(0)
    }
}

async fn send(out: &dyn Messenger, chat_id: i64, reply: &BotReply) -> Result<()> {
    if reply.markdown {
        out.send_text(chat_id, &reply.text).await
    } else {
        out.send_plain(chat_id, &reply.text).await
    }
}

/// `/name@bot args` → (`name`, `args`).
fn split_command(text: &str) -> (String, String) {
    let trimmed = text.trim().trim_start_matches('/');
    let (head, rest) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    (name, rest.trim().to_string())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
