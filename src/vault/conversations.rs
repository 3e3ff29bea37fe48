//! Persisting chat transcripts into the vault.
//!
//! A saved conversation becomes `AI-Conversations/<timestamp>-<slug>.md` with
//! extracted metadata in its header, and gets linked from today's daily note.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;

use super::files::FileAccessor;
use super::frontmatter::Note;
use super::metadata;
use super::projects::ProjectManager;
use crate::conversation::ConversationContext;
use crate::error::{OpError, OpResult};
use crate::llm::{ChatMessage, Role};

pub const CONVERSATIONS_FOLDER: &str = "AI-Conversations";
pub const DAILY_NOTES_FOLDER: &str = "Daily-Notes";
const AI_SECTION: &str = "## AI Conversations\n";
const MAX_SLUG_LEN: usize = 50;

/// Everything needed to write one transcript.
#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    pub messages: Vec<ChatMessage>,
    /// Explicit topic; derived from the first user message when empty.
    pub topic: String,
    pub context: Option<ConversationContext>,
    pub platform: String,
    /// LLM-written summary; the first user message is used when absent.
    pub summary: Option<String>,
    pub key_insights: Vec<String>,
    /// Vault-relative path of an earlier save of the same conversation,
    /// rewritten in place instead of creating a new file.
    pub existing: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConversationSaver {
    vault_root: PathBuf,
    files: FileAccessor,
    projects: ProjectManager,
}

impl ConversationSaver {
    pub fn new(vault_root: impl Into<PathBuf>, files: FileAccessor, projects: ProjectManager) -> Self {
        Self {
            vault_root: vault_root.into(),
            files,
            projects,
        }
    }

    /// Write the transcript and link it from the daily note. Returns the
    /// vault-relative path of the file. A rewrite of an existing transcript
    /// keeps its path and is not linked again.
    pub fn save_conversation(&self, request: &SaveRequest) -> OpResult<String> {
        self.save_conversation_at(request, Local::now())
    }

    pub fn save_conversation_at(
        &self,
        request: &SaveRequest,
        now: DateTime<Local>,
    ) -> OpResult<String> {
        if request.messages.is_empty() {
            return Err(OpError::validation("No messages to save"));
        }

        let topic_source = if request.topic.trim().is_empty() {
            extract_topic(&request.messages)
        } else {
            request.topic.clone()
        };
        let slug = slugify(&topic_source);
        let topic = if request.topic.trim().is_empty() {
            slug.clone()
        } else {
            request.topic.trim().to_string()
        };

        let path = match &request.existing {
            Some(existing) => self.vault_root.join(existing),
            None => self.unique_path(&now.format("%Y-%m-%d-%H%M%S").to_string(), &slug),
        };
        let is_new = !path.is_file();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let full_text = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let meta = metadata::extract_all(&full_text);
        let summary = request
            .summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| fallback_summary(&request.messages));

        let mut note = Note::new(format_transcript(&request.messages));
        note.set("type", "ai-conversation");
        note.set("date", now.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string());
        note.set("platform", request.platform.as_str());
        note.set("topic", topic.as_str());
        note.set("category", meta.category.as_str());
        note.set("mood", meta.mood.as_str());
        note.set("priority", meta.priority.as_str());
        note.set_list("tags", meta.tags.clone());
        note.set("summary", summary);
        note.set_list("action_items", meta.action_items.clone());
        note.set_list("key_insights", request.key_insights.clone());
        if let Some(ctx) = &request.context {
            note.set_list("related_projects", [ctx.name.clone()]);
            note.set("context_type", ctx.kind.as_str());
        }

        self.files.write_file(&path, &note.render()?)?;
        let relative = format!("{CONVERSATIONS_FOLDER}/{filename}");
        tracing::info!(
            path = %relative,
            messages = request.messages.len(),
            rewrite = !is_new,
            "saved conversation"
        );

        if is_new {
            if let Err(e) = self.link_to_daily_note(&filename, &topic, now) {
                tracing::warn!(error = %e, "failed to link conversation from daily note");
            }
        }
        if let Some(ctx) = &request.context {
            if let Err(e) = self.projects.link_conversation(&ctx.name, &relative) {
                tracing::warn!(record = %ctx.name, error = %e, "failed to link conversation to record");
            }
        }

        Ok(relative)
    }

    pub fn daily_note_path(&self, date: &str) -> PathBuf {
        self.vault_root
            .join(DAILY_NOTES_FOLDER)
            .join(format!("{date}.md"))
    }

    fn link_to_daily_note(&self, filename: &str, topic: &str, now: DateTime<Local>) -> OpResult<()> {
        let today = now.format("%Y-%m-%d").to_string();
        let path = self.daily_note_path(&today);
        let link = format!("- [[{CONVERSATIONS_FOLDER}/{filename}|{topic}]]");

        let content = if path.is_file() {
            let mut note = Note::parse(&self.files.read_file(&path)?)?;
            if note.body.contains(AI_SECTION) {
                note.body = note
                    .body
                    .replacen(AI_SECTION, &format!("{AI_SECTION}{link}\n"), 1);
            } else {
                note.body.push_str(&format!("\n\n{AI_SECTION}{link}\n"));
            }
            note.render()?
        } else {
            daily_note_template(&today, &link)
        };

        self.files.write_file(&path, &content)
    }

    fn unique_path(&self, timestamp: &str, slug: &str) -> PathBuf {
        let folder = self.vault_root.join(CONVERSATIONS_FOLDER);
        let first = folder.join(format!("{timestamp}-{slug}.md"));
        if !first.exists() {
            return first;
        }
        (2..)
            .map(|n| folder.join(format!("{timestamp}-{slug}-{n}.md")))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }

    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }
}

/// First line of the first user message, up to 50 characters.
pub fn extract_topic(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| {
            let head: String = m.content.chars().take(50).collect();
            head.trim().lines().next().unwrap_or("").trim().to_string()
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "conversation".to_string())
}

pub fn slugify(text: &str) -> String {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let strip = STRIP.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let lower = text.trim().to_lowercase();
    let cleaned = strip.replace_all(&lower, "");
    let hyphenated = spaces.replace_all(&cleaned, "-");
    let truncated: String = hyphenated.chars().take(MAX_SLUG_LEN).collect();
    let slug = truncated.trim_matches('-');
    if slug.is_empty() {
        "conversation".to_string()
    } else {
        slug.to_string()
    }
}

fn fallback_summary(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| format!("{}...", m.content.chars().take(100).collect::<String>()))
        .unwrap_or_default()
}

fn format_transcript(messages: &[ChatMessage]) -> String {
    let mut lines = vec!["## Conversation\n".to_string()];
    for msg in messages {
        let role = msg.role.title();
        if msg.role == Role::User {
            lines.push(format!("**{role}:** {}\n", msg.content));
        } else {
            lines.push(format!("**{role}:**\n{}\n", msg.content));
        }
    }
    format!("\n{}", lines.join("\n"))
}

fn daily_note_template(date: &str, initial_link: &str) -> String {
    format!(
        "---\ndate: {date}\ntype: daily-note\ntags: [daily]\n---\n\n# {date}\n\n\
         ## Goals for Today\n\n- [ ] Define daily goals\n\n## Completed\n\n-\n\n\
         ## Reflections\n\n{AI_SECTION}{initial_link}\n\n"
    )
}
