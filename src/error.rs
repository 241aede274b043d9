//! Error types for footprint.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 6=sync, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for footprint operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,

    // Not Found (exit 3)
    NotInGitRepo,
    RepoNotTracked,

    // Validation (exit 4)
    InvalidArgument,
    InvalidStatus,
    InvalidSource,
    InvalidTransition,
    InvalidRepo,

    // Sync (exit 6)
    GitError,
    DirtyExportRepo,
    ManualResolution,
    ExportLocked,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,
    CsvError,
    InsufficientDiskSpace,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NotInGitRepo => "NOT_IN_GIT_REPO",
            Self::RepoNotTracked => "REPO_NOT_TRACKED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidSource => "INVALID_SOURCE",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::InvalidRepo => "INVALID_REPO",
            Self::GitError => "GIT_ERROR",
            Self::DirtyExportRepo => "DIRTY_EXPORT_REPO",
            Self::ManualResolution => "MANUAL_RESOLUTION",
            Self::ExportLocked => "EXPORT_LOCKED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::CsvError => "CSV_ERROR",
            Self::InsufficientDiskSpace => "INSUFFICIENT_DISK_SPACE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError => 2,
            Self::NotInGitRepo | Self::RepoNotTracked => 3,
            Self::InvalidArgument
            | Self::InvalidStatus
            | Self::InvalidSource
            | Self::InvalidTransition
            | Self::InvalidRepo => 4,
            Self::GitError | Self::DirtyExportRepo | Self::ManualResolution | Self::ExportLocked => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError | Self::CsvError | Self::InsufficientDiskSpace => 8,
        }
    }

    /// Whether retrying the same operation later may succeed without
    /// operator intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError | Self::GitError | Self::ExportLocked
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in footprint operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid event status: {0}")]
    InvalidStatus(String),

    #[error("Invalid event source: {0}")]
    InvalidSource(String),

    #[error("Invalid status transition: events cannot move back to {to}")]
    InvalidTransition { to: String },

    #[error("Could not determine repository identity: {0}")]
    InvalidRepo(String),

    #[error("Not in a git repository: {}", path.display())]
    NotInGitRepo { path: PathBuf },

    #[error("Repository is not tracked: {id}")]
    RepoNotTracked { id: String },

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("Export repository has an incomplete {operation} in {}", path.display())]
    DirtyExportRepo { operation: String, path: PathBuf },

    #[error("Conflict in {file} requires manual resolution")]
    ManualResolution { file: String },

    #[error("Export lock at {} is held by another process (waited {waited:?})", path.display())]
    ExportLocked { path: PathBuf, waited: Duration },

    #[error("insufficient disk space: need {needed} bytes, have {available}")]
    InsufficientDiskSpace { needed: u64, available: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Csv(_) => ErrorCode::CsvError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::InvalidStatus(_) => ErrorCode::InvalidStatus,
            Self::InvalidSource(_) => ErrorCode::InvalidSource,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::InvalidRepo(_) => ErrorCode::InvalidRepo,
            Self::NotInGitRepo { .. } => ErrorCode::NotInGitRepo,
            Self::RepoNotTracked { .. } => ErrorCode::RepoNotTracked,
            Self::Git { .. } => ErrorCode::GitError,
            Self::DirtyExportRepo { .. } => ErrorCode::DirtyExportRepo,
            Self::ManualResolution { .. } => ErrorCode::ManualResolution,
            Self::ExportLocked { .. } => ErrorCode::ExportLocked,
            Self::InsufficientDiskSpace { .. } => ErrorCode::InsufficientDiskSpace,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInGitRepo { .. } => {
                Some("Run this command inside a git working tree.".to_string())
            }

            Self::RepoNotTracked { .. } => {
                Some("Start tracking it with `fp track` from inside the repository.".to_string())
            }

            Self::InvalidStatus(_) => {
                Some("Valid statuses: pending, exported, orphaned, skipped".to_string())
            }

            Self::InvalidSource(_) => Some(
                "Valid sources: post-commit, post-rewrite, post-checkout, post-merge, \
                 pre-push, manual, backfill"
                    .to_string(),
            ),

            Self::DirtyExportRepo { operation, path } => {
                let abort = match operation.as_str() {
                    "rebase" => "git rebase --abort",
                    "cherry-pick" => "git cherry-pick --abort",
                    _ => "git merge --abort",
                };
                Some(format!(
                    "Resolve with: cd {} && {abort} (or finish the {operation})",
                    path.display()
                ))
            }

            Self::ManualResolution { .. } => Some(
                "Only CSV files are merged automatically. The merge was aborted; \
                 resolve the conflict in the export repository by hand and re-run `fp export`."
                    .to_string(),
            ),

            Self::ExportLocked { .. } => Some(
                "Another `fp export` is running. Wait for it to finish and try again.".to_string(),
            ),

            Self::InsufficientDiskSpace { .. } => {
                Some("Free some disk space and re-run `fp export`.".to_string())
            }

            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Csv(_)
            | Self::InvalidArgument(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidRepo(_)
            | Self::Git { .. }
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_space_message_names_both_sizes() {
        let err = Error::InsufficientDiskSpace {
            needed: 4000,
            available: 100,
        };
        assert_eq!(
            err.to_string(),
            "insufficient disk space: need 4000 bytes, have 100"
        );
        assert_eq!(err.exit_code(), 8);
    }

    #[test]
    fn test_dirty_repo_hint_matches_operation() {
        let err = Error::DirtyExportRepo {
            operation: "rebase".to_string(),
            path: PathBuf::from("/tmp/export"),
        };
        let hint = err.hint().unwrap();
        assert!(hint.contains("git rebase --abort"));
        assert!(hint.contains("/tmp/export"));
    }

    #[test]
    fn test_structured_json_shape() {
        let err = Error::ManualResolution {
            file: "notes.md".to_string(),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "MANUAL_RESOLUTION");
        assert_eq!(json["error"]["exit_code"], 6);
        assert_eq!(json["error"]["retryable"], false);
        assert!(json["error"]["hint"].is_string());
    }

    #[test]
    fn test_retryable_codes() {
        assert!(ErrorCode::GitError.is_retryable());
        assert!(ErrorCode::ExportLocked.is_retryable());
        assert!(!ErrorCode::ManualResolution.is_retryable());
        assert!(!ErrorCode::InvalidTransition.is_retryable());
    }
}
