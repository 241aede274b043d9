//! Database migrations embedded at compile time.
//!
//! Migrations live in `/migrations/` at the crate root and are embedded
//! with `include_str!`, so the binary has no runtime file dependencies.

use rusqlite::{Connection, Result};
use tracing::{info, warn};

/// A single migration with version identifier and SQL content.
struct Migration {
    version: &'static str,
    sql: &'static str,
}

/// All migrations in order.
///
/// Version names match the SQL filenames (without .sql extension).
const MIGRATIONS: &[Migration] = &[Migration {
    version: "001_add_event_timestamp_index",
    sql: include_str!("../../migrations/001_add_event_timestamp_index.sql"),
}];

/// Run all pending migrations on the database.
///
/// Already-applied migrations (tracked in `schema_migrations`) are skipped,
/// so this is safe to call on every open.
///
/// # Errors
///
/// Returns an error if a migration fails to apply. Duplicate-column errors
/// from `ALTER TABLE` are logged and the migration is marked complete.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: std::collections::HashSet<String> = conn
        .prepare("SELECT version FROM schema_migrations")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    for migration in MIGRATIONS {
        if applied.contains(migration.version) {
            continue;
        }

        info!(version = migration.version, "Applying migration");

        if let Err(e) = conn.execute_batch(migration.sql) {
            if e.to_string().contains("duplicate column name") {
                warn!(
                    version = migration.version,
                    "Migration partially applied (columns exist), marking complete"
                );
            } else {
                return Err(e);
            }
        }

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().timestamp_millis()],
        )?;
    }

    Ok(())
}
