//! Event model for footprint.
//!
//! An event is one observed activity occurrence (commit, rewrite, checkout,
//! merge, push) in a tracked repository. Status and source are persisted as
//! small integers; the integer values are a storage compatibility contract
//! and must never be renumbered.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::RepoId;

/// Export lifecycle status of an event.
///
/// `Pending` is the initial state. Transitions are one-directional:
/// nothing ever moves back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Pending,
    Exported,
    /// Repository no longer tracked; excluded from export and purged later.
    Orphaned,
    Skipped,
}

impl EventStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Exported, Self::Orphaned, Self::Skipped];

    /// Stable integer code used in storage.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Exported => 1,
            Self::Orphaned => 2,
            Self::Skipped => 3,
        }
    }

    /// Decode a stored integer code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Exported),
            2 => Some(Self::Orphaned),
            3 => Some(Self::Skipped),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Exported => "EXPORTED",
            Self::Orphaned => "ORPHANED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidStatus(s.to_string()))
    }
}

/// Which hook or trigger produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum EventSource {
    PostCommit,
    PostRewrite,
    PostCheckout,
    PostMerge,
    PrePush,
    Manual,
    Backfill,
}

impl EventSource {
    pub const ALL: [Self; 7] = [
        Self::PostCommit,
        Self::PostRewrite,
        Self::PostCheckout,
        Self::PostMerge,
        Self::PrePush,
        Self::Manual,
        Self::Backfill,
    ];

    /// Stable integer code used in storage.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::PostCommit => 0,
            Self::PostRewrite => 1,
            Self::PostCheckout => 2,
            Self::PostMerge => 3,
            Self::PrePush => 4,
            Self::Manual => 5,
            Self::Backfill => 6,
        }
    }

    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::PostCommit),
            1 => Some(Self::PostRewrite),
            2 => Some(Self::PostCheckout),
            3 => Some(Self::PostMerge),
            4 => Some(Self::PrePush),
            5 => Some(Self::Manual),
            6 => Some(Self::Backfill),
            _ => None,
        }
    }

    /// Display name, also written to the `source` column of exported CSVs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostCommit => "POST-COMMIT",
            Self::PostRewrite => "POST-REWRITE",
            Self::PostCheckout => "POST-CHECKOUT",
            Self::PostMerge => "POST-MERGE",
            Self::PrePush => "PRE-PUSH",
            Self::Manual => "MANUAL",
            Self::Backfill => "BACKFILL",
        }
    }

    /// Short alias accepted on the command line (`commit`, `push`, ...).
    const fn alias(self) -> &'static str {
        match self {
            Self::PostCommit => "commit",
            Self::PostRewrite => "rewrite",
            Self::PostCheckout => "checkout",
            Self::PostMerge => "merge",
            Self::PrePush => "push",
            Self::Manual => "manual",
            Self::Backfill => "backfill",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|source| {
                source.as_str().eq_ignore_ascii_case(s) || source.alias().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| Error::InvalidSource(s.to_string()))
    }
}

impl ToSql for EventStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for EventStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        Self::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

impl ToSql for EventSource {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for EventSource {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        Self::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// A stored activity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Local identifier assigned by the store (monotonic)
    pub id: i64,

    pub repo_id: RepoId,

    /// Filesystem path at observation time; used only for enrichment
    pub repo_path: String,

    /// Full commit hash
    pub commit: String,

    pub branch: String,

    /// When the event was recorded (not the commit's authored time)
    pub timestamp: DateTime<Utc>,

    pub status: EventStatus,

    pub source: EventSource,
}

/// An event that has not been stored yet.
///
/// The store assigns the id; new events always start as `Pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub repo_id: RepoId,
    pub repo_path: String,
    pub commit: String,
    pub branch: String,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
}

/// Criteria for listing events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub repo_id: Option<RepoId>,
    pub status: Option<EventStatus>,
    pub source: Option<EventSource>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}
