//! Tagged result type shared by the vault, command, and bot layers.
//!
//! Every fallible domain operation returns [`OpResult`]. The surfaces (HTTP
//! routes, Telegram handlers, CLI) turn an [`OpError`] into a user-facing
//! message or a status code; nothing is raised past that boundary.

use serde::Serialize;

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input: bad command syntax, progress out of range, empty query.
    Validation,
    /// File, note, project, or directory does not exist.
    NotFound,
    /// Resolved path lies outside every allowed root.
    PathNotAllowed,
    /// Target already exists (e.g. creating a project twice).
    AlreadyExists,
    /// Any other filesystem failure.
    Io,
    /// LLM or messaging backend failure.
    Backend,
    /// Upstream or local rate limit hit.
    RateLimited,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::PathNotAllowed => "path_not_allowed",
            Self::AlreadyExists => "already_exists",
            Self::Io => "io",
            Self::Backend => "backend",
            Self::RateLimited => "rate_limited",
        }
    }

    /// HTTP status code used when this kind crosses the API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::PathNotAllowed => 403,
            Self::AlreadyExists => 409,
            Self::Io => 500,
            Self::Backend => 502,
            Self::RateLimited => 429,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure variant of [`OpResult`]: a kind plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OpError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type OpResult<T> = Result<T, OpError>;

impl OpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn path_not_allowed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PathNotAllowed, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }
}

impl From<std::io::Error> for OpError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(e.to_string()),
            _ => Self::io(e.to_string()),
        }
    }
}
