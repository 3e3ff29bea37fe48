//! The markdown note vault.
//!
//! [`Vault`] is the single entry point used by the HTTP routes, the Telegram
//! handlers, the command parser, and the nudging jobs. It owns a
//! [`FileAccessor`] restricted to the vault root plus the project and
//! conversation managers built on top of it.

pub mod conversations;
pub mod files;
pub mod frontmatter;
pub mod metadata;
pub mod projects;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::error::{OpError, OpResult};
use conversations::ConversationSaver;
use files::FileAccessor;
use projects::ProjectManager;

const NOTE_PATTERN: &str = "**/*.md";
const MAX_EXCERPT_CHARS: usize = 200;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Vault-relative path.
    pub file: String,
    pub excerpt: String,
    pub line_number: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub results: Vec<SearchResult>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteEntry {
    pub path: String,
    pub name: String,
    /// Parent folder relative to the vault, empty for top-level notes.
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    files: FileAccessor,
    projects: ProjectManager,
    conversations: ConversationSaver,
}

impl Vault {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let files = FileAccessor::new([root.as_ref()]);
        // The accessor canonicalises its roots; keep the same spelling here so
        // relative paths strip cleanly.
        let root = files
            .allowed_roots()
            .first()
            .cloned()
            .unwrap_or_else(|| root.as_ref().to_path_buf());
        let projects = ProjectManager::new(root.clone(), files.clone());
        let conversations = ConversationSaver::new(root.clone(), files.clone(), projects.clone());
        tracing::info!(vault = %root.display(), "vault initialized");
        Self {
            root,
            files,
            projects,
            conversations,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &FileAccessor {
        &self.files
    }

    pub fn projects(&self) -> &ProjectManager {
        &self.projects
    }

    pub fn conversations(&self) -> &ConversationSaver {
        &self.conversations
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Line-level search across every note; at most `limit` hits are returned.
    pub fn search_vault(&self, query: &str, limit: usize) -> OpResult<SearchResults> {
        self.ensure_exists()?;
        let hits = self.files.search_in_files(&self.root, query, NOTE_PATTERN)?;

        let results: Vec<SearchResult> = hits
            .into_iter()
            .take(limit)
            .map(|hit| SearchResult {
                file: self.relative(&hit.file),
                excerpt: hit.line_content.chars().take(MAX_EXCERPT_CHARS).collect(),
                line_number: hit.line_number,
            })
            .collect();

        Ok(SearchResults {
            count: results.len(),
            results,
        })
    }

    pub fn read_note(&self, relative_path: &str) -> OpResult<String> {
        self.files.read_file(self.root.join(relative_path))
    }

    pub fn list_all_notes(&self) -> OpResult<Vec<NoteEntry>> {
        self.ensure_exists()?;
        let notes = self
            .files
            .list_files(&self.root, NOTE_PATTERN)?
            .into_iter()
            .filter_map(|path| {
                let rel = path.strip_prefix(&self.root).ok()?.to_path_buf();
                let folder = rel
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Some(NoteEntry {
                    path: rel.to_string_lossy().into_owned(),
                    name: path.file_name()?.to_string_lossy().into_owned(),
                    folder,
                })
            })
            .collect();
        Ok(notes)
    }

    /// Most recently modified notes first.
    pub fn list_recent_notes(&self, limit: usize) -> OpResult<Vec<String>> {
        self.ensure_exists()?;
        let mut with_mtime: Vec<(SystemTime, PathBuf)> = self
            .files
            .list_files(&self.root, NOTE_PATTERN)?
            .into_iter()
            .map(|path| {
                let mtime = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (mtime, path)
            })
            .collect();
        with_mtime.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(with_mtime
            .into_iter()
            .take(limit)
            .map(|(_, path)| self.relative(&path))
            .collect())
    }

    fn ensure_exists(&self) -> OpResult<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(OpError::not_found(format!(
                "Vault not found: {}",
                self.root.display()
            )))
        }
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
    }
}
