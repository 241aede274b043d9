//! SQLite storage implementation.
//!
//! The event store. Writers from concurrent hook processes are serialized by
//! SQLite itself; every mutation runs inside an IMMEDIATE transaction so a
//! batch status update is all-or-nothing.

use crate::error::{Error, Result};
use crate::model::{Event, EventFilter, EventSource, EventStatus, NewEvent, RepoId};
use crate::storage::schema::apply_schema;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const EVENT_COLUMNS: &str =
    "id, repo_id, repo_path, commit_hash, branch, timestamp, status_id, source_id";

/// SQLite-based event store.
///
/// The handle is owned by the caller; open one per process and pass it down.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Number of stored events in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub exported: usize,
    pub orphaned: usize,
    pub skipped: usize,
}

impl StatusCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.exported + self.orphaned + self.skipped
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout_ms.map_or(Duration::from_secs(5), Duration::from_millis))?;

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation inside an IMMEDIATE transaction.
    ///
    /// The closure's error rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let result = f(&tx)?;
        tx.commit()?;

        debug!(op, "Mutation committed");
        Ok(result)
    }

    // ==================
    // Event Operations
    // ==================

    /// Insert an event, or refresh it when `(repo_id, commit, source)`
    /// already exists.
    ///
    /// Re-inserting updates `timestamp`, `branch` and `repo_path` in place and
    /// leaves the status alone, so the same hook firing twice yields one row.
    /// Returns the id of the inserted or updated row.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn insert_event(&mut self, event: &NewEvent) -> Result<i64> {
        let timestamp = format_timestamp(&event.timestamp);

        self.mutate("insert_event", |tx| {
            let id = tx.query_row(
                "INSERT INTO repo_events (repo_id, repo_path, commit_hash, branch, timestamp, status_id, source_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(repo_id, commit_hash, source_id) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    branch = excluded.branch,
                    repo_path = excluded.repo_path
                 RETURNING id",
                rusqlite::params![
                    event.repo_id,
                    event.repo_path,
                    event.commit,
                    event.branch,
                    timestamp,
                    EventStatus::Pending,
                    event.source,
                ],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    /// All `Pending` events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_pending(&self) -> Result<Vec<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM repo_events WHERE status_id = ?1 ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([EventStatus::Pending], map_event_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Events with `id > since`, ascending. Used by live-tail consumers.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_since(&self, since: i64) -> Result<Vec<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM repo_events WHERE id > ?1 ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([since], map_event_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// List events matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM repo_events WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(repo_id) = &filter.repo_id {
            sql.push_str(" AND repo_id = ?");
            params.push(Box::new(repo_id.clone()));
        }

        if let Some(status) = filter.status {
            sql.push_str(" AND status_id = ?");
            params.push(Box::new(status));
        }

        if let Some(source) = filter.source {
            sql.push_str(" AND source_id = ?");
            params.push(Box::new(source));
        }

        if let Some(since) = &filter.since {
            sql.push_str(" AND timestamp >= ?");
            params.push(Box::new(format_timestamp(since)));
        }

        if let Some(until) = &filter.until {
            sql.push_str(" AND timestamp <= ?");
            params.push(Box::new(format_timestamp(until)));
        }

        sql.push_str(" ORDER BY id DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(limit));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let rows = stmt.query_map(params_refs.as_slice(), map_event_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Set the status of every listed event in one transaction.
    ///
    /// An empty slice is a no-op. Moving events back to `Pending` is refused.
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for `Pending`, or a database error (in which
    /// case no row was changed).
    pub fn update_statuses(&mut self, ids: &[i64], status: EventStatus) -> Result<usize> {
        if status == EventStatus::Pending {
            return Err(Error::InvalidTransition {
                to: status.to_string(),
            });
        }
        if ids.is_empty() {
            return Ok(0);
        }

        self.mutate("update_statuses", |tx| {
            let mut stmt = tx.prepare_cached("UPDATE repo_events SET status_id = ?1 WHERE id = ?2")?;
            let mut changed = 0;
            for id in ids {
                changed += stmt.execute(rusqlite::params![status, id])?;
            }
            Ok(changed)
        })
    }

    /// Delete all `Orphaned` events. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_orphaned(&mut self) -> Result<usize> {
        self.mutate("delete_orphaned", |tx| {
            Ok(tx.execute(
                "DELETE FROM repo_events WHERE status_id = ?1",
                [EventStatus::Orphaned],
            )?)
        })
    }

    /// Mark a repository's pending events `Orphaned` after it is untracked.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_repo_orphaned(&mut self, repo_id: &RepoId) -> Result<usize> {
        self.mutate("mark_repo_orphaned", |tx| {
            Ok(tx.execute(
                "UPDATE repo_events SET status_id = ?1 WHERE repo_id = ?2 AND status_id = ?3",
                rusqlite::params![EventStatus::Orphaned, repo_id, EventStatus::Pending],
            )?)
        })
    }

    /// Highest event id, or 0 for an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn max_event_id(&self) -> Result<i64> {
        let id = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM repo_events", [], |row| row.get(0))?;
        Ok(id)
    }

    /// Count events per status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_by_status(&self) -> Result<StatusCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status_id, COUNT(*) FROM repo_events GROUP BY status_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, EventStatus>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = usize::try_from(count).unwrap_or(0);
            match status {
                EventStatus::Pending => counts.pending = count,
                EventStatus::Exported => counts.exported = count,
                EventStatus::Orphaned => counts.orphaned = count,
                EventStatus::Skipped => counts.skipped = count,
            }
        }
        Ok(counts)
    }
}

/// Canonical storage form of a timestamp.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn map_event_row(row: &Row) -> rusqlite::Result<Event> {
    let raw: String = row.get(5)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(Event {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        repo_path: row.get(2)?,
        commit: row.get(3)?,
        branch: row.get(4)?,
        timestamp,
        status: row.get::<_, EventStatus>(6)?,
        source: row.get::<_, EventSource>(7)?,
    })
}
