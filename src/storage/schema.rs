//! Database schema definitions.
//!
//! Events are keyed by `(repo_id, commit_hash, source_id)`. Status and
//! source are stored as their stable integer codes.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The base SQL schema for the footprint store.
///
/// Timestamps are stored as RFC3339 text in UTC, which sorts lexically.
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Activity Events
-- ====================

CREATE TABLE IF NOT EXISTS repo_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id TEXT NOT NULL,
    repo_path TEXT NOT NULL,
    commit_hash TEXT NOT NULL,
    branch TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL,
    status_id INTEGER NOT NULL DEFAULT 0 CHECK (status_id BETWEEN 0 AND 3),
    source_id INTEGER NOT NULL CHECK (source_id BETWEEN 0 AND 6),
    UNIQUE (repo_id, commit_hash, source_id)
);

CREATE INDEX IF NOT EXISTS idx_repo_events_status ON repo_events(status_id);
CREATE INDEX IF NOT EXISTS idx_repo_events_repo ON repo_events(repo_id);
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`, and migrations skip
/// versions already recorded.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"repo_events".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");
    }

    #[test]
    fn test_unique_key_is_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let insert = "INSERT INTO repo_events (repo_id, repo_path, commit_hash, timestamp, source_id)
                      VALUES ('r', '/r', 'abc', '2025-01-01T00:00:00Z', 0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn test_status_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO repo_events (repo_id, repo_path, commit_hash, timestamp, status_id, source_id)
             VALUES ('r', '/r', 'abc', '2025-01-01T00:00:00Z', 7, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
