//! Path-restricted file access over the vault tree.
//!
//! Every operation resolves its target first and checks that it is a
//! descendant of one of the allowed roots. A path that escapes the roots is
//! rejected before any read, write, or directory walk happens on it.

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{OpError, OpResult};

/// One matching line from [`FileAccessor::search_in_files`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchHit {
    pub file: PathBuf,
    /// 1-based.
    pub line_number: usize,
    pub line_content: String,
}

#[derive(Debug, Clone)]
pub struct FileAccessor {
    allowed_roots: Vec<PathBuf>,
}

impl FileAccessor {
    pub fn new<I, P>(allowed_roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let allowed_roots = allowed_roots
            .into_iter()
            .map(|root| resolve_physical(&absolute(root.as_ref())))
            .collect();
        Self { allowed_roots }
    }

    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Resolve `path` and verify containment.
    ///
    /// `..` components are collapsed lexically, then the longest existing
    /// ancestor is canonicalised so symlinks pointing out of a root are caught.
    pub fn resolve(&self, path: impl AsRef<Path>) -> OpResult<PathBuf> {
        let path = path.as_ref();
        let resolved = resolve_physical(&absolute(path));

        if self
            .allowed_roots
            .iter()
            .any(|root| resolved.starts_with(root))
        {
            Ok(resolved)
        } else {
            tracing::warn!(path = %path.display(), "path not allowed");
            Err(OpError::path_not_allowed(format!(
                "Path not allowed: {}",
                path.display()
            )))
        }
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> OpResult<String> {
        let path = path.as_ref();
        let resolved = self.resolve(path)?;
        if !resolved.is_file() {
            return Err(OpError::not_found(format!(
                "File not found: {}",
                path.display()
            )));
        }
        Ok(std::fs::read_to_string(&resolved)?)
    }

    /// Write `content`, creating parent directories as needed.
    pub fn write_file(&self, path: impl AsRef<Path>, content: &str) -> OpResult<()> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&resolved, content)?;
        tracing::debug!(path = %resolved.display(), bytes = content.len(), "file written");
        Ok(())
    }

    /// List files under `dir` whose path relative to `dir` matches `pattern`.
    ///
    /// `*` does not cross directory separators; use `**/` for recursion.
    pub fn list_files(&self, dir: impl AsRef<Path>, pattern: &str) -> OpResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let root = self.resolve(dir)?;
        if !root.is_dir() {
            return Err(OpError::not_found(format!(
                "Directory not found: {}",
                dir.display()
            )));
        }
        let matcher = compile_glob(pattern)?;

        let mut files: Vec<PathBuf> = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .strip_prefix(&root)
                    .map(|rel| matcher.is_match(rel))
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Case-insensitive substring search, line by line, across matching files.
    pub fn search_in_files(
        &self,
        dir: impl AsRef<Path>,
        query: &str,
        pattern: &str,
    ) -> OpResult<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(OpError::validation("Search query is required"));
        }
        let needle = query.to_lowercase();
        let mut hits = Vec::new();

        for file in self.list_files(dir, pattern)? {
            let content = match std::fs::read_to_string(&file) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            for (idx, line) in content.lines().enumerate() {
                if line.to_lowercase().contains(&needle) {
                    hits.push(SearchHit {
                        file: file.clone(),
                        line_number: idx + 1,
                        line_content: line.trim().to_string(),
                    });
                }
            }
        }

        Ok(hits)
    }
}

fn compile_glob(pattern: &str) -> OpResult<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| OpError::validation(format!("invalid glob pattern '{pattern}': {e}")))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    }
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalise the longest existing ancestor and re-append the rest.
fn resolve_physical(path: &Path) -> PathBuf {
    let normalized = normalize_lexically(path);
    let mut existing = normalized.as_path();
    let mut remainder = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in remainder.iter().rev() {
                resolved.push(part);
            }
            return normalize_lexically(&resolved);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, FileAccessor) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Projects")).unwrap();
        std::fs::write(dir.path().join("root.md"), "Hello World\nnothing here\n").unwrap();
        std::fs::write(
            dir.path().join("Projects/alpha.md"),
            "# Alpha\nsay hello again\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("Projects/notes.txt"), "hello txt\n").unwrap();
        let files = FileAccessor::new([dir.path()]);
        (dir, files)
    }

    #[test]
    fn traversal_outside_root_is_rejected() {
        let (dir, files) = setup();
        let escape = dir.path().join("../../etc/passwd");
        let err = files.read_file(&escape).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::PathNotAllowed);

        let err = files.read_file("/etc/passwd").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::PathNotAllowed);

        let sneaky = dir.path().join("Projects/../../outside.md");
        assert!(files.write_file(&sneaky, "x").is_err());
        assert!(!dir.path().parent().unwrap().join("outside.md").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_rejected() {
        let (dir, files) = setup();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.md"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = files.read_file(dir.path().join("link/secret.md")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::PathNotAllowed);
    }

    #[test]
    fn write_then_read_creates_parents() {
        let (dir, files) = setup();
        let target = dir.path().join("Daily-Notes/2024/today.md");
        files.write_file(&target, "entry").unwrap();
        assert_eq!(files.read_file(&target).unwrap(), "entry");
    }

    #[test]
    fn missing_file_is_not_found() {
        let (dir, files) = setup();
        let err = files.read_file(dir.path().join("nope.md")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn list_files_respects_separator_in_glob() {
        let (dir, files) = setup();
        let top = files.list_files(dir.path(), "*.md").unwrap();
        assert_eq!(top.len(), 1);

        let all = files.list_files(dir.path(), "**/*.md").unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn search_is_case_insensitive_with_line_numbers() {
        let (dir, files) = setup();
        let hits = files.search_in_files(dir.path(), "HELLO", "**/*.md").unwrap();
        assert_eq!(hits.len(), 2);
        let alpha = hits
            .iter()
            .find(|h| h.file.ends_with("alpha.md"))
            .unwrap();
        assert_eq!(alpha.line_number, 2);
        assert_eq!(alpha.line_content, "say hello again");
    }

    #[test]
    fn empty_query_is_validation_error() {
        let (dir, files) = setup();
        let err = files.search_in_files(dir.path(), "  ", "**/*.md").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }
}
