//! Per-user chat buffers for the Telegram bot.
//!
//! State lives in memory only and is lost on restart. The manager decides
//! when a buffer should be auto-saved but never saves on its own.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Local};

use crate::llm::{ChatMessage, Role};
use crate::vault::projects::RecordKind;

/// Saving once this many messages have accumulated since the last save.
pub const AUTO_SAVE_MESSAGE_THRESHOLD: usize = 4;
/// Saving once this long has passed since the previous save.
pub const AUTO_SAVE_INTERVAL_MINUTES: i64 = 5;

/// The project or goal a conversation is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationContext {
    pub kind: RecordKind,
    pub name: String,
}

impl std::fmt::Display for ConversationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub start_time: DateTime<Local>,
    pub topic: Option<String>,
    pub context: Option<ConversationContext>,
    pub last_save_time: Option<DateTime<Local>>,
    pub message_count_since_save: usize,
    /// Vault-relative transcript written by the first save.
    pub saved_path: Option<String>,
}

impl ConversationState {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            messages: Vec::new(),
            start_time: now,
            topic: None,
            context: None,
            last_save_time: None,
            message_count_since_save: 0,
            saved_path: None,
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
        self.message_count_since_save += 1;
    }

    pub fn should_auto_save(&self, now: DateTime<Local>) -> bool {
        if self.message_count_since_save >= AUTO_SAVE_MESSAGE_THRESHOLD {
            return true;
        }
        match self.last_save_time {
            Some(last) => now - last >= Duration::minutes(AUTO_SAVE_INTERVAL_MINUTES),
            None => false,
        }
    }

    pub fn mark_saved(&mut self, now: DateTime<Local>, path: String) {
        self.last_save_time = Some(now);
        self.message_count_since_save = 0;
        self.saved_path = Some(path);
    }

    /// Messages added since the last save.
    pub fn has_unsaved(&self) -> bool {
        !self.messages.is_empty() && self.message_count_since_save > 0
    }
}

#[derive(Debug, Default)]
pub struct ConversationManager {
    states: HashMap<i64, ConversationState>,
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's buffer, created on first access.
    pub fn get_mut(&mut self, user_id: i64) -> &mut ConversationState {
        self.states
            .entry(user_id)
            .or_insert_with(|| ConversationState::new(Local::now()))
    }

    pub fn get(&self, user_id: i64) -> Option<&ConversationState> {
        self.states.get(&user_id)
    }

    /// Replace the user's buffer with a fresh one, returning the old state.
    pub fn reset(&mut self, user_id: i64) -> Option<ConversationState> {
        self.states
            .insert(user_id, ConversationState::new(Local::now()))
    }

    pub fn push(&mut self, user_id: i64, role: Role, content: impl Into<String>) {
        self.get_mut(user_id).push(role, content);
    }

    pub fn should_auto_save(&self, user_id: i64, now: DateTime<Local>) -> bool {
        self.states
            .get(&user_id)
            .is_some_and(|state| state.should_auto_save(now))
    }

    pub fn mark_saved(&mut self, user_id: i64, now: DateTime<Local>, path: String) {
        self.get_mut(user_id).mark_saved(now, path);
    }

    pub fn active_users(&self) -> usize {
        self.states.len()
    }
}
