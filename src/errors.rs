//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// IPC communication failure.
    Ipc(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested item, lock, agent, or preference does not exist.
    NotFound(String),
    /// Optimistic version check failed; re-read and retry.
    VersionConflict(String),
    /// Scope is held by another live lease, or a token did not match.
    LockUnavailable(String),
    /// Caller lacks the capability required for the operation.
    Forbidden(String),
    /// Request is malformed.
    Validation(String),
    /// Request collides with an existing record (duplicate source id).
    Conflict(String),
}

impl AppError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Db(_) => "db_error",
            Self::Ipc(_) => "ipc_error",
            Self::Io(_) => "io_error",
            Self::NotFound(_) => "not_found",
            Self::VersionConflict(_) => "version_conflict",
            Self::LockUnavailable(_) => "lock_unavailable",
            Self::Forbidden(_) => "forbidden",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
        }
    }

    /// Whether the caller may retry the same operation (after re-reading
    /// the item or choosing another candidate).
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::VersionConflict(_) | Self::LockUnavailable(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::VersionConflict(msg) => write!(f, "version conflict: {msg}"),
            Self::LockUnavailable(msg) => write!(f, "lock unavailable: {msg}"),
            Self::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}
