//! Project and goal records under `<vault>/Projects/`.
//!
//! Each record is a markdown note whose header carries title, type, progress
//! (0–100), priority, status, timestamps, and related conversations. Every
//! mutation rewrites the whole file.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;

use super::files::FileAccessor;
use super::frontmatter::Note;
use crate::error::{ErrorKind, OpError, OpResult};

pub const PROJECTS_FOLDER: &str = "Projects";
const GOAL_PREFIX: &str = "Goal-";
const PROGRESS_LOG_HEADER: &str = "## Progress Log\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Sort rank for a raw header value; unknown values rank as medium.
    fn rank_of(raw: &str) -> Priority {
        raw.parse().unwrap_or(Priority::Medium)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = OpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(OpError::validation(format!(
                "unknown priority: {other} (expected high, medium, or low)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Project,
    Goal,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Goal => "goal",
        }
    }
}

/// Summary of one project or goal file.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub progress: i64,
    pub priority: String,
    pub status: String,
    pub last_updated: Option<String>,
    pub related_conversations: Vec<String>,
    /// Vault-relative path.
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct ProjectManager {
    vault_root: PathBuf,
    folder: PathBuf,
    files: FileAccessor,
}

impl ProjectManager {
    pub fn new(vault_root: impl Into<PathBuf>, files: FileAccessor) -> Self {
        let vault_root = vault_root.into();
        let folder = vault_root.join(PROJECTS_FOLDER);
        Self {
            vault_root,
            folder,
            files,
        }
    }

    pub fn create_project(
        &self,
        name: &str,
        description: &str,
        priority: Priority,
    ) -> OpResult<String> {
        let path = self.folder.join(format!("{}.md", sanitize_filename(name)?));
        if path.exists() {
            return Err(OpError::already_exists(format!(
                "Project \"{name}\" already exists"
            )));
        }

        let now = Local::now();
        let mut note = Note::new(project_body(name, description, now));
        note.set("title", name);
        note.set("type", RecordKind::Project.as_str());
        note.set("created", timestamp(now));
        note.set("last_updated", timestamp(now));
        note.set("progress", 0);
        note.set("priority", priority.as_str());
        note.set("status", "active");
        note.set_list("tags", ["project", priority.as_str()]);
        note.set_list("related_conversations", Vec::<String>::new());

        self.files.write_file(&path, &note.render()?)?;
        tracing::info!(project = %name, path = %path.display(), "created project");
        Ok(self.relative(&path))
    }

    pub fn create_goal(
        &self,
        name: &str,
        description: &str,
        target_date: Option<&str>,
        habit_tracking: bool,
    ) -> OpResult<String> {
        let path = self
            .folder
            .join(format!("{GOAL_PREFIX}{}.md", sanitize_filename(name)?));
        if path.exists() {
            return Err(OpError::already_exists(format!(
                "Goal \"{name}\" already exists"
            )));
        }

        let now = Local::now();
        let mut note = Note::new(goal_body(name, description, habit_tracking, now));
        note.set("title", name);
        note.set("type", RecordKind::Goal.as_str());
        note.set("created", timestamp(now));
        note.set("last_updated", timestamp(now));
        note.set("target_date", target_date.unwrap_or("TBD"));
        note.set("progress", 0);
        note.set("priority", Priority::High.as_str());
        note.set("status", "active");
        note.set_list("tags", ["goal"]);
        note.set_list("related_conversations", Vec::<String>::new());

        self.files.write_file(&path, &note.render()?)?;
        tracing::info!(goal = %name, path = %path.display(), "created goal");
        Ok(self.relative(&path))
    }

    /// Set progress (0–100) and, with `notes`, prepend a dated Progress Log entry.
    pub fn update_progress(&self, name: &str, progress: i64, notes: &str) -> OpResult<()> {
        if !(0..=100).contains(&progress) {
            return Err(OpError::validation(
                "Progress must be a number from 0 to 100.",
            ));
        }
        let path = self.find_record_file(name)?;
        let mut note = Note::parse(&self.files.read_file(&path)?)?;

        let now = Local::now();
        note.set("progress", progress);
        note.set("last_updated", timestamp(now));

        if !notes.trim().is_empty() {
            let entry = format!(
                "- **{}** ({progress}%): {}\n",
                now.format("%Y-%m-%d"),
                notes.trim()
            );
            if note.body.contains(PROGRESS_LOG_HEADER) {
                note.body = note.body.replacen(
                    PROGRESS_LOG_HEADER,
                    &format!("{PROGRESS_LOG_HEADER}{entry}"),
                    1,
                );
            } else {
                note.body.push_str(&format!("\n{PROGRESS_LOG_HEADER}{entry}"));
            }
        }

        self.files.write_file(&path, &note.render()?)?;
        tracing::info!(record = %name, progress, "updated progress");
        Ok(())
    }

    pub fn read_project(&self, name: &str) -> OpResult<ProjectRecord> {
        let path = self.find_record_file(name)?;
        let note = Note::parse(&self.files.read_file(&path)?)?;
        Ok(self.record_from_note(&path, &note))
    }

    /// Raw markdown of a record, header included.
    pub fn read_project_text(&self, name: &str) -> OpResult<String> {
        let path = self.find_record_file(name)?;
        self.files.read_file(&path)
    }

    /// Records with progress below 100, ordered by priority then progress.
    pub fn active_projects(&self) -> OpResult<Vec<ProjectRecord>> {
        let mut records: Vec<ProjectRecord> = self
            .all_records()?
            .into_iter()
            .filter(|r| r.progress < 100)
            .collect();
        records.sort_by(|a, b| {
            Priority::rank_of(&a.priority)
                .cmp(&Priority::rank_of(&b.priority))
                .then(a.progress.cmp(&b.progress))
        });
        Ok(records)
    }

    /// Active records not updated in `days_threshold` days. Records with a
    /// missing or unparsable `last_updated` count as stalled.
    pub fn stalled_projects(&self, days_threshold: i64) -> OpResult<Vec<ProjectRecord>> {
        self.stalled_projects_at(days_threshold, Local::now().naive_local())
    }

    pub fn stalled_projects_at(
        &self,
        days_threshold: i64,
        now: NaiveDateTime,
    ) -> OpResult<Vec<ProjectRecord>> {
        let cutoff = now - Duration::days(days_threshold);
        Ok(self
            .active_projects()?
            .into_iter()
            .filter(|r| match r.last_updated.as_deref().and_then(parse_timestamp) {
                Some(updated) => updated < cutoff,
                None => true,
            })
            .collect())
    }

    pub fn link_conversation(&self, name: &str, conversation_path: &str) -> OpResult<()> {
        let path = self.find_record_file(name)?;
        let mut note = Note::parse(&self.files.read_file(&path)?)?;

        let mut related = note.get_list("related_conversations");
        if related.iter().any(|c| c == conversation_path) {
            return Ok(());
        }
        related.push(conversation_path.to_string());
        note.set_list("related_conversations", related);

        self.files.write_file(&path, &note.render()?)?;
        tracing::debug!(record = %name, conversation = %conversation_path, "linked conversation");
        Ok(())
    }

    fn all_records(&self) -> OpResult<Vec<ProjectRecord>> {
        let paths = match self.files.list_files(&self.folder, "*.md") {
            Ok(paths) => paths,
            Err(e) if e.kind == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut records = Vec::new();
        for path in paths {
            let hidden = path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true);
            if hidden {
                continue;
            }
            match self.files.read_file(&path).and_then(|text| Note::parse(&text)) {
                Ok(note) => records.push(self.record_from_note(&path, &note)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record")
                }
            }
        }
        Ok(records)
    }

    fn find_record_file(&self, name: &str) -> OpResult<PathBuf> {
        let filename = sanitize_filename(name)?;
        let project = self.folder.join(format!("{filename}.md"));
        if project.is_file() {
            return Ok(project);
        }
        let goal = self.folder.join(format!("{GOAL_PREFIX}{filename}.md"));
        if goal.is_file() {
            return Ok(goal);
        }
        Err(OpError::not_found(format!(
            "Project/goal \"{name}\" not found"
        )))
    }

    fn record_from_note(&self, path: &Path, note: &Note) -> ProjectRecord {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let is_goal = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(GOAL_PREFIX))
            .unwrap_or(false);

        ProjectRecord {
            name: note.get_str("title").map(str::to_string).unwrap_or(stem),
            kind: if is_goal {
                RecordKind::Goal
            } else {
                RecordKind::Project
            },
            progress: note.get_i64("progress").unwrap_or(0),
            priority: note.get_str("priority").unwrap_or("medium").to_string(),
            status: note.get_str("status").unwrap_or("active").to_string(),
            last_updated: note.get_str("last_updated").map(str::to_string),
            related_conversations: note.get_list("related_conversations"),
            path: self.relative(path),
        }
    }

    fn relative(&self, path: &Path) -> String {
        let root = self
            .files
            .allowed_roots()
            .iter()
            .find(|r| path.starts_with(r))
            .cloned()
            .unwrap_or_else(|| self.vault_root.clone());
        path.strip_prefix(&root)
            .or_else(|_| path.strip_prefix(&self.vault_root))
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

/// Word characters, whitespace, and hyphens survive; whitespace runs become `-`.
pub fn sanitize_filename(name: &str) -> OpResult<String> {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let strip = STRIP.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let cleaned = strip.replace_all(name, "");
    let hyphenated = spaces.replace_all(&cleaned, "-");
    let safe = hyphenated.trim_matches('-').to_string();
    if safe.is_empty() {
        return Err(OpError::validation(format!(
            "name \"{name}\" has no usable characters"
        )));
    }
    Ok(safe)
}

fn timestamp(now: DateTime<Local>) -> String {
    now.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn project_body(name: &str, description: &str, now: DateTime<Local>) -> String {
    let description = if description.trim().is_empty() {
        "Project description here."
    } else {
        description.trim()
    };
    format!(
        "\n# {name}\n\n{description}\n\n## Goals\n\n- [ ] Define project goals\n\n\
         ## Tasks\n\n- [ ] Initial task\n\n{PROGRESS_LOG_HEADER}- **{date}** (0%): Project created\n\n\
         ## Notes\n\n",
        date = now.format("%Y-%m-%d"),
    )
}

fn goal_body(name: &str, description: &str, habit_tracking: bool, now: DateTime<Local>) -> String {
    let description = if description.trim().is_empty() {
        "Goal description here."
    } else {
        description.trim()
    };
    let habit_section = if habit_tracking {
        "\n## Daily Habit Tracker\n\n| Date | Done | Notes |\n|------|------|-------|\n| | | |\n"
    } else {
        ""
    };
    format!(
        "\n# {name}\n\n{description}\n\n## Success Criteria\n\n- [ ] Define success criteria\n\n\
         ## Milestones\n\n- [ ] First milestone\n{habit_section}\n\
         {PROGRESS_LOG_HEADER}- **{date}** (0%): Goal created\n\n## Notes\n\n",
        date = now.format("%Y-%m-%d"),
    )
}
