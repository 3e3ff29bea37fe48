//! Proactive Telegram nudges.
//!
//! [`NudgeThrottle`] gates every send: a daily cap, an active-hours window,
//! and a per-kind cooldown. [`NudgingService`] builds the message for each
//! scheduled job from the vault and pushes it through a [`Messenger`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, Timelike};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::Mutex;

use super::{PeriodicTask, ScheduledJob};
use crate::config::NudgingConfig;
use crate::vault::projects::{ProjectRecord, RecordKind};
use crate::vault::Vault;

const STALLED_DAYS: i64 = 7;
const MAX_LISTED: usize = 5;
const PROGRESS_BAR_WIDTH: usize = 10;

const MORNING_MESSAGES: &[&str] = &[
    "Good morning! What's the ONE thing that would make today a win?",
    "Rise and shine! Ready to make progress on your goals today?",
    "New day, new opportunities. What are you focusing on today?",
];

const AFTERNOON_MESSAGES: &[&str] = &[
    "Afternoon check-in: How's your day going so far?",
    "Quick check: Making progress on today's priorities?",
    "Mid-day pulse check. Need to adjust any plans?",
];

const EVENING_MESSAGES: &[&str] = &[
    "Day's wrapping up. What did you accomplish today?",
    "Evening reflection: What went well today? What could be better?",
    "Time to wind down. What are you grateful for today?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NudgeKind {
    Morning,
    Afternoon,
    Evening,
    Weekly,
    Stalled,
    Custom,
}

impl NudgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Weekly => "weekly",
            Self::Stalled => "stalled",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for NudgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeDecision {
    Allowed,
    DailyLimit,
    OutsideActiveHours,
    Cooldown,
}

impl NudgeDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug)]
pub struct NudgeThrottle {
    history: HashMap<NudgeKind, Vec<DateTime<Local>>>,
    sent_today: usize,
    last_reset_date: NaiveDate,
    max_per_day: usize,
    start_hour: u32,
    end_hour: u32,
    cooldown: Duration,
}

impl NudgeThrottle {
    pub fn new(config: &NudgingConfig, now: DateTime<Local>) -> Self {
        Self {
            history: HashMap::new(),
            sent_today: 0,
            last_reset_date: now.date_naive(),
            max_per_day: config.max_per_day,
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            cooldown: Duration::minutes(config.same_type_cooldown_minutes),
        }
    }

    /// Clear the counter and history once the date changes.
    pub fn roll_over(&mut self, now: DateTime<Local>) {
        let today = now.date_naive();
        if today != self.last_reset_date {
            self.sent_today = 0;
            self.history.clear();
            self.last_reset_date = today;
        }
    }

    pub fn can_send(&mut self, kind: NudgeKind, now: DateTime<Local>) -> NudgeDecision {
        self.roll_over(now);

        if self.sent_today >= self.max_per_day {
            return NudgeDecision::DailyLimit;
        }
        if !self.within_active_hours(now) {
            return NudgeDecision::OutsideActiveHours;
        }
        let last = self.history.get(&kind).and_then(|times| times.last());
        if let Some(last) = last {
            if now - *last < self.cooldown {
                return NudgeDecision::Cooldown;
            }
        }
        NudgeDecision::Allowed
    }

    pub fn record(&mut self, kind: NudgeKind, now: DateTime<Local>) {
        self.history.entry(kind).or_default().push(now);
        self.sent_today += 1;
    }

    pub fn within_active_hours(&self, now: DateTime<Local>) -> bool {
        (self.start_hour..self.end_hour).contains(&now.hour())
    }

    pub fn sent_today(&self) -> usize {
        self.sent_today
    }
}

/// Anything that can deliver a text message to a chat.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Markdown-formatted message.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Unformatted message, for text that may not be valid markup.
    async fn send_plain(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_text(chat_id, text).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NudgeStatus {
    pub enabled: bool,
    pub nudges_sent_today: usize,
    pub max_per_day: usize,
    pub active_hours: String,
    pub within_active_hours: bool,
}

pub struct NudgingService {
    messenger: Option<Arc<dyn Messenger>>,
    vault: Arc<Vault>,
    chat_id: Option<i64>,
    enabled: bool,
    config: NudgingConfig,
    throttle: Mutex<NudgeThrottle>,
}

impl NudgingService {
    pub fn new(
        config: &NudgingConfig,
        messenger: Option<Arc<dyn Messenger>>,
        vault: Arc<Vault>,
        chat_id: Option<i64>,
    ) -> Self {
        let enabled = config.enabled && chat_id.is_some();
        if enabled {
            tracing::info!(
                start_hour = config.start_hour,
                end_hour = config.end_hour,
                "nudging enabled"
            );
        } else {
            tracing::warn!("nudging disabled (no chat id or turned off in config)");
        }
        Self {
            messenger,
            vault,
            chat_id,
            enabled,
            config: config.clone(),
            throttle: Mutex::new(NudgeThrottle::new(config, Local::now())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Gate, send, and record. Returns whether a message went out.
    pub async fn send_nudge(&self, kind: NudgeKind, message: &str) -> bool {
        self.send_nudge_at(kind, message, Local::now()).await
    }

    pub async fn send_nudge_at(&self, kind: NudgeKind, message: &str, now: DateTime<Local>) -> bool {
        if !self.enabled {
            tracing::debug!(kind = %kind, "nudging disabled, skipping");
            return false;
        }
        let (Some(messenger), Some(chat_id)) = (&self.messenger, self.chat_id) else {
            tracing::warn!(kind = %kind, "cannot send nudge without a messenger and chat id");
            return false;
        };

        // Held across the send so two jobs cannot both pass the gate.
        let mut throttle = self.throttle.lock().await;
        let decision = throttle.can_send(kind, now);
        if !decision.is_allowed() {
            tracing::debug!(kind = %kind, decision = ?decision, "nudge throttled");
            return false;
        }

        match messenger.send_text(chat_id, message).await {
            Ok(()) => {
                throttle.record(kind, now);
                tracing::info!(kind = %kind, "sent nudge");
                true
            }
            Err(e) => {
                tracing::error!(kind = %kind, error = %e, "failed to send nudge");
                false
            }
        }
    }

    pub async fn send_custom_nudge(&self, message: &str) -> bool {
        self.send_nudge(NudgeKind::Custom, message).await
    }

    pub async fn status(&self, now: DateTime<Local>) -> NudgeStatus {
        let mut throttle = self.throttle.lock().await;
        throttle.roll_over(now);
        NudgeStatus {
            enabled: self.enabled,
            nudges_sent_today: throttle.sent_today(),
            max_per_day: self.config.max_per_day,
            active_hours: format!("{}:00-{}:00", self.config.start_hour, self.config.end_hour),
            within_active_hours: throttle.within_active_hours(now),
        }
    }

    pub async fn run_job(&self, kind: NudgeKind) {
        let message = match kind {
            NudgeKind::Morning => Some(format!("🌅 {}", pick(MORNING_MESSAGES))),
            NudgeKind::Afternoon => Some(format!("☀️ {}", pick(AFTERNOON_MESSAGES))),
            NudgeKind::Evening => Some(format!("🌙 {}", pick(EVENING_MESSAGES))),
            NudgeKind::Weekly => self.weekly_review_message(),
            NudgeKind::Stalled => self.stalled_message(),
            NudgeKind::Custom => None,
        };
        if let Some(message) = message {
            self.send_nudge(kind, &message).await;
        }
    }

    fn weekly_review_message(&self) -> Option<String> {
        match self.vault.projects().active_projects() {
            Ok(records) => Some(weekly_review(&records)),
            Err(e) => {
                tracing::error!(error = %e, "weekly review failed");
                None
            }
        }
    }

    fn stalled_message(&self) -> Option<String> {
        match self.vault.projects().stalled_projects(STALLED_DAYS) {
            Ok(records) => stalled_alert(&records),
            Err(e) => {
                tracing::error!(error = %e, "stalled check failed");
                None
            }
        }
    }

    /// The five standard jobs: three daily check-ins, a Sunday review, and a
    /// Wednesday stalled-project check.
    pub fn default_schedule(self: &Arc<Self>) -> Result<Vec<ScheduledJob>> {
        let entries = [
            ("morning_motivation", "0 0 9 * * *", NudgeKind::Morning),
            ("afternoon_checkin", "0 0 14 * * *", NudgeKind::Afternoon),
            ("evening_reflection", "0 0 19 * * *", NudgeKind::Evening),
            ("weekly_review", "0 0 18 * * Sun", NudgeKind::Weekly),
            ("midweek_stalled", "0 0 10 * * Wed", NudgeKind::Stalled),
        ];
        entries
            .into_iter()
            .map(|(name, cron, kind)| {
                let task: Arc<dyn PeriodicTask> = Arc::new(NudgeJob {
                    service: Arc::clone(self),
                    kind,
                });
                ScheduledJob::new(name, cron, task)
            })
            .collect()
    }
}

struct NudgeJob {
    service: Arc<NudgingService>,
    kind: NudgeKind,
}

#[async_trait]
impl PeriodicTask for NudgeJob {
    async fn run(&self) {
        self.service.run_job(self.kind).await;
    }
}

fn pick(messages: &[&str]) -> String {
    messages
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
        .to_string()
}

pub fn progress_bar(progress: i64) -> String {
    let clamped = progress.clamp(0, 100) as usize;
    let filled = clamped * PROGRESS_BAR_WIDTH / 100;
    format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(PROGRESS_BAR_WIDTH - filled)
    )
}

pub fn weekly_review(records: &[ProjectRecord]) -> String {
    if records.is_empty() {
        return "📅 **Weekly Review**\n\nNo active projects. Time to set some goals?".to_string();
    }
    let mut text = String::from("📅 **Weekly Review**\n\n");

    let goals: Vec<&ProjectRecord> = records.iter().filter(|r| r.kind == RecordKind::Goal).collect();
    let projects: Vec<&ProjectRecord> = records
        .iter()
        .filter(|r| r.kind == RecordKind::Project)
        .collect();

    if !goals.is_empty() {
        text.push_str("**Goals:**\n");
        for g in goals.iter().take(MAX_LISTED) {
            text.push_str(&progress_line(g));
        }
        text.push('\n');
    }
    if !projects.is_empty() {
        text.push_str("**Projects:**\n");
        for p in projects.iter().take(MAX_LISTED) {
            text.push_str(&progress_line(p));
        }
    }
    text.push_str("\nHow did this week go? What's the focus for next week?");
    text
}

fn progress_line(record: &ProjectRecord) -> String {
    format!(
        "• {}: {} {}%\n",
        record.name,
        progress_bar(record.progress),
        record.progress
    )
}

/// `None` when nothing is stalled.
pub fn stalled_alert(records: &[ProjectRecord]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    let mut text = format!(
        "⚠️ **Stalled Projects Alert**\n\nThese haven't been updated in {STALLED_DAYS}+ days:\n\n"
    );
    for r in records.iter().take(MAX_LISTED) {
        text.push_str(&format!("• {} ({}%)\n", r.name, r.progress));
    }
    text.push_str("\nNeed to reprioritize or make some progress?");
    Some(text)
}
