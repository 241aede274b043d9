//! Export orchestration.
//!
//! An export run moves pending events into the export repository:
//!
//! 1. List pending events (dry runs stop here, before locking)
//! 2. Take the export lock
//! 3. Honor the export interval unless forced
//! 4. Prepare the repository and pull from `origin`; a failed pull means
//!    the run continues offline
//! 5. Rewrite the affected CSV files and commit them
//! 6. Push, then mark events exported
//!
//! # At-least-once delivery
//!
//! Events are marked `Exported` only after the push succeeded (or when no
//! remote is configured). A failed push leaves them `Pending`; the next run
//! rewrites the same rows, which replace themselves by `(repo, commit)`, so
//! retries never duplicate a row.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::git::{MetadataSource, Transport};
use crate::model::{Event, EventStatus};
use crate::storage::SqliteStorage;
use crate::sync::csv::{csv_path_for, ExportRecord, RowMap};
use crate::sync::file::write_csv_sorted;
use crate::sync::lock::{ExportLock, DEFAULT_LOCK_TIMEOUT};
use crate::sync::state::{should_export, ExportState, StateStore};
use crate::sync::types::{ExportOptions, ExportReport, Materialized, SkipReason};

/// Hostname recorded in the `machine` column; empty if unavailable.
#[must_use]
pub fn machine_name() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_default()
}

/// Write `events` into the export files under `export_dir`.
///
/// Events are routed by the year of their own timestamp. Each affected file
/// is loaded, updated by `(repo, commit)`, sorted and atomically replaced.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read or a write fails.
/// Files written before the failure keep their new content.
pub fn materialize(
    export_dir: &Path,
    events: &[Event],
    current_year: i32,
    enricher: &dyn MetadataSource,
    machine: &str,
) -> Result<Materialized> {
    let mut by_file: BTreeMap<PathBuf, Vec<&Event>> = BTreeMap::new();
    for event in events {
        by_file
            .entry(csv_path_for(export_dir, &event.timestamp, current_year))
            .or_default()
            .push(event);
    }

    let mut result = Materialized::default();
    for (path, file_events) in by_file {
        let mut rows = RowMap::load(&path)?;

        for event in file_events {
            let meta = if event.repo_path.is_empty() {
                crate::git::CommitMetadata::default()
            } else {
                enricher.metadata(Path::new(&event.repo_path), &event.commit)
            };
            rows.upsert(ExportRecord::build(event, &meta, machine));
            result.exported_ids.push(event.id);
        }

        write_csv_sorted(&path, &rows)?;
        debug!(file = %path.display(), rows = rows.len(), "Export file written");
        result.modified_files.push(path);
    }

    Ok(result)
}

/// Drives one export run against the event store.
pub struct Exporter<'a> {
    storage: &'a mut SqliteStorage,
    transport: &'a dyn Transport,
    metadata: &'a dyn MetadataSource,
    state: &'a dyn StateStore,
    export_dir: PathBuf,
    interval: Duration,
    machine: String,
    lock_timeout: Duration,
    now: Option<DateTime<Utc>>,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub fn new(
        storage: &'a mut SqliteStorage,
        transport: &'a dyn Transport,
        metadata: &'a dyn MetadataSource,
        state: &'a dyn StateStore,
        export_dir: PathBuf,
        interval: Duration,
    ) -> Self {
        Self {
            storage,
            transport,
            metadata,
            state,
            export_dir,
            interval,
            machine: machine_name(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            now: None,
        }
    }

    /// Override the `machine` column value.
    #[must_use]
    pub fn with_machine(mut self, machine: impl Into<String>) -> Self {
        self.machine = machine.into();
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Pin the clock, for deterministic year routing and interval checks.
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    #[must_use]
    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    /// Run an export.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, the repository is mid
    /// merge/rebase, files cannot be written, the commit fails, or statuses
    /// cannot be updated. Pull and push failures are not errors: they show
    /// up as `offline` / `pushed == false` in the report.
    pub fn run(&mut self, options: ExportOptions) -> Result<ExportReport> {
        if options.dry_run {
            return Ok(ExportReport::dry_run(self.storage.list_pending()?));
        }

        let _lock = ExportLock::acquire(&self.export_dir, self.lock_timeout)?;

        let pending = self.storage.list_pending()?;
        let pending_count = pending.len();
        if pending.is_empty() {
            debug!("No pending events");
            return Ok(ExportReport::skipped(0, SkipReason::NothingPending));
        }

        let now = self.now();
        if !options.force {
            let state = self.state.load()?;
            if !should_export(&state, self.interval, now.timestamp()) {
                debug!(last_export = state.last_export, "Export interval not elapsed");
                return Ok(ExportReport::skipped(pending_count, SkipReason::IntervalNotElapsed));
            }
        }

        let dir = self.export_dir.clone();
        self.transport.ensure_repo(&dir)?;
        self.transport.check_clean_state(&dir)?;

        let has_remote = self.transport.has_remote(&dir);
        let mut offline = false;
        if has_remote {
            if let Err(e) = self.transport.pull(&dir) {
                warn!(error = %e, "Could not sync with remote, continuing offline");
                offline = true;
            }
        }

        let materialized = materialize(&dir, &pending, now.year(), self.metadata, &self.machine)?;
        self.transport.commit(&dir, &materialized.modified_files)?;

        let mut report = ExportReport {
            pending: pending_count,
            files: materialized.modified_files,
            offline,
            ..ExportReport::default()
        };

        if has_remote {
            if let Err(e) = self.transport.push(&dir) {
                warn!(error = %e, "Push failed, events stay pending");
                return Ok(report);
            }
            report.pushed = true;
        }

        report.exported = self
            .storage
            .update_statuses(&materialized.exported_ids, EventStatus::Exported)?;

        match self.storage.delete_orphaned() {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, "Deleted orphaned events"),
            Err(e) => warn!(error = %e, "Could not delete orphaned events"),
        }

        if let Err(e) = self.state.save(&ExportState {
            last_export: now.timestamp(),
        }) {
            warn!(error = %e, "Could not record export time");
        }

        info!(
            exported = report.exported,
            files = report.files.len(),
            pushed = report.pushed,
            "Export complete"
        );
        Ok(report)
    }
}

/// Export if the interval has elapsed; for hooks, which must never fail.
pub fn maybe_export(exporter: &mut Exporter<'_>) -> Option<ExportReport> {
    match exporter.run(ExportOptions::default()) {
        Ok(report) => {
            if let Some(reason) = report.skipped_reason {
                debug!(reason = reason.as_str(), "Auto-export skipped");
            }
            Some(report)
        }
        Err(e) => {
            error!(error = %e, "Auto-export failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::git::CommitMetadata;
    use crate::model::{EventSource, NewEvent, RepoId};
    use crate::sync::state::MemoryStateStore;
    use chrono::TimeZone;
    use std::cell::{Cell, RefCell};
    use std::fs;

    /// Transport that records calls and fails on demand.
    #[derive(Default)]
    struct FakeTransport {
        remote: bool,
        fail_pull: bool,
        fail_push: Cell<bool>,
        commits: RefCell<Vec<usize>>,
        pushes: Cell<usize>,
    }

    impl Transport for FakeTransport {
        fn ensure_repo(&self, dir: &Path) -> Result<()> {
            fs::create_dir_all(dir)?;
            Ok(())
        }
        fn has_remote(&self, _dir: &Path) -> bool {
            self.remote
        }
        fn check_clean_state(&self, _dir: &Path) -> Result<()> {
            Ok(())
        }
        fn pull(&self, _dir: &Path) -> Result<()> {
            if self.fail_pull {
                return Err(Error::Git {
                    command: "fetch".into(),
                    message: "offline".into(),
                });
            }
            Ok(())
        }
        fn push(&self, _dir: &Path) -> Result<()> {
            if self.fail_push.get() {
                return Err(Error::Git {
                    command: "push".into(),
                    message: "rejected".into(),
                });
            }
            self.pushes.set(self.pushes.get() + 1);
            Ok(())
        }
        fn commit(&self, _dir: &Path, files: &[PathBuf]) -> Result<bool> {
            self.commits.borrow_mut().push(files.len());
            Ok(!files.is_empty())
        }
        fn set_remote(&self, _dir: &Path, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    struct NoMetadata;

    impl MetadataSource for NoMetadata {
        fn metadata(&self, _repo_path: &Path, _commit: &str) -> CommitMetadata {
            CommitMetadata::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn record(storage: &mut SqliteStorage, commit: &str, ts: DateTime<Utc>) -> i64 {
        storage
            .insert_event(&NewEvent {
                repo_id: RepoId::new("github.com/acme/widgets"),
                repo_path: String::new(),
                commit: commit.to_string(),
                branch: "main".to_string(),
                timestamp: ts,
                source: EventSource::PostCommit,
            })
            .unwrap()
    }

    fn data_rows(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    fn forced() -> ExportOptions {
        ExportOptions {
            force: true,
            dry_run: false,
        }
    }

    #[test]
    fn test_three_years_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export");
        let mut storage = SqliteStorage::open_memory().unwrap();
        record(&mut storage, "a2023", Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap());
        record(&mut storage, "b2024", Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        record(&mut storage, "c2025", Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());

        let transport = FakeTransport::default();
        let state = MemoryStateStore::default();
        let report = Exporter::new(&mut storage, &transport, &NoMetadata, &state, export.clone(), Duration::from_secs(3600))
            .with_machine("box")
            .with_now(now())
            .run(forced())
            .unwrap();

        assert_eq!(report.exported, 3);
        assert_eq!(report.files.len(), 3);
        assert!(!report.pushed);
        for name in ["commits-2023.csv", "commits-2024.csv", "commits.csv"] {
            assert_eq!(data_rows(&export.join(name)).len(), 1, "{name}");
        }
        assert!(storage.list_pending().unwrap().is_empty());
        assert_eq!(state.get().last_export, now().timestamp());
        assert_eq!(*transport.commits.borrow(), vec![3]);
    }

    #[test]
    fn test_push_failure_keeps_pending_then_exports_once() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export");
        let mut storage = SqliteStorage::open_memory().unwrap();
        record(&mut storage, "abc", now());

        let transport = FakeTransport {
            remote: true,
            ..FakeTransport::default()
        };
        transport.fail_push.set(true);
        let state = MemoryStateStore::default();

        let report = Exporter::new(&mut storage, &transport, &NoMetadata, &state, export.clone(), Duration::ZERO)
            .with_now(now())
            .run(forced())
            .unwrap();
        assert!(!report.pushed);
        assert_eq!(report.exported, 0);
        assert_eq!(storage.list_pending().unwrap().len(), 1);
        assert_eq!(state.get().last_export, 0, "failed run does not count");

        transport.fail_push.set(false);
        let report = Exporter::new(&mut storage, &transport, &NoMetadata, &state, export.clone(), Duration::ZERO)
            .with_now(now())
            .run(forced())
            .unwrap();
        assert!(report.pushed);
        assert_eq!(report.exported, 1);
        assert!(storage.list_pending().unwrap().is_empty());
        assert_eq!(data_rows(&export.join("commits.csv")).len(), 1);

        // Nothing left: a third run writes nothing.
        let report = Exporter::new(&mut storage, &transport, &NoMetadata, &state, export.clone(), Duration::ZERO)
            .with_now(now())
            .run(forced())
            .unwrap();
        assert_eq!(report.skipped_reason, Some(SkipReason::NothingPending));
        assert_eq!(transport.pushes.get(), 1);
    }

    #[test]
    fn test_pull_failure_continues_offline() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = SqliteStorage::open_memory().unwrap();
        record(&mut storage, "abc", now());

        let transport = FakeTransport {
            remote: true,
            fail_pull: true,
            ..FakeTransport::default()
        };
        let state = MemoryStateStore::default();
        let report = Exporter::new(&mut storage, &transport, &NoMetadata, &state, dir.path().join("export"), Duration::ZERO)
            .with_now(now())
            .run(forced())
            .unwrap();

        assert!(report.offline);
        assert!(report.pushed);
        assert_eq!(report.exported, 1);
    }

    #[test]
    fn test_interval_gate_and_force() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export");
        let mut storage = SqliteStorage::open_memory().unwrap();
        record(&mut storage, "abc", now());

        let transport = FakeTransport::default();
        let state = MemoryStateStore::new(ExportState {
            last_export: now().timestamp() - 60,
        });

        let report = Exporter::new(&mut storage, &transport, &NoMetadata, &state, export.clone(), Duration::from_secs(3600))
            .with_now(now())
            .run(ExportOptions::default())
            .unwrap();
        assert_eq!(report.skipped_reason, Some(SkipReason::IntervalNotElapsed));
        assert_eq!(report.pending, 1);
        assert!(!export.exists());

        let report = Exporter::new(&mut storage, &transport, &NoMetadata, &state, export, Duration::from_secs(3600))
            .with_now(now())
            .run(forced())
            .unwrap();
        assert_eq!(report.exported, 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export");
        let mut storage = SqliteStorage::open_memory().unwrap();
        record(&mut storage, "abc", now());

        let transport = FakeTransport::default();
        let state = MemoryStateStore::default();
        let report = Exporter::new(&mut storage, &transport, &NoMetadata, &state, export.clone(), Duration::ZERO)
            .run(ExportOptions {
                force: true,
                dry_run: true,
            })
            .unwrap();

        assert_eq!(report.skipped_reason, Some(SkipReason::DryRun));
        assert_eq!(report.pending, 1);
        assert_eq!(report.would_export.len(), 1);
        assert_eq!(report.would_export[0].commit, "abc");
        assert_eq!(report.would_export[0].branch, "main");
        assert!(!export.exists());
        assert!(!ExportLock::path_for(&export).exists());
        assert_eq!(storage.list_pending().unwrap().len(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["would_export"][0]["commit"], "abc");
        assert_eq!(json["would_export"][0]["repo_id"], "github.com/acme/widgets");
    }

    #[test]
    fn test_export_purges_orphaned() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = SqliteStorage::open_memory().unwrap();
        record(&mut storage, "keep", now());
        storage
            .insert_event(&NewEvent {
                repo_id: RepoId::new("local:/gone"),
                repo_path: String::new(),
                commit: "x".into(),
                branch: "main".into(),
                timestamp: now(),
                source: EventSource::PostCommit,
            })
            .unwrap();
        storage.mark_repo_orphaned(&RepoId::new("local:/gone")).unwrap();

        let transport = FakeTransport::default();
        let state = MemoryStateStore::default();
        Exporter::new(&mut storage, &transport, &NoMetadata, &state, dir.path().join("export"), Duration::ZERO)
            .with_now(now())
            .run(forced())
            .unwrap();

        let counts = storage.count_by_status().unwrap();
        assert_eq!(counts.orphaned, 0);
        assert_eq!(counts.exported, 1);
    }

    #[test]
    fn test_materialize_is_order_independent() {
        let ts = |d| Utc.with_ymd_and_hms(2025, 3, d, 9, 0, 0).unwrap();
        let event = |id, commit: &str, day| Event {
            id,
            repo_id: RepoId::new("github.com/acme/widgets"),
            repo_path: String::new(),
            commit: commit.to_string(),
            branch: "main".to_string(),
            timestamp: ts(day),
            status: EventStatus::Pending,
            source: EventSource::PostCommit,
        };
        let events = vec![event(1, "c", 3), event(2, "a", 1), event(3, "b", 2), event(4, "d", 1)];
        let mut reversed = events.clone();
        reversed.reverse();

        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        materialize(first.path(), &events, 2025, &NoMetadata, "m").unwrap();
        materialize(second.path(), &reversed, 2025, &NoMetadata, "m").unwrap();

        let a = fs::read(first.path().join("commits.csv")).unwrap();
        let b = fs::read(second.path().join("commits.csv")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_materialize_across_runs_matches_single_run() {
        let event = |id, commit: &str, month| Event {
            id,
            repo_id: RepoId::new("github.com/acme/widgets"),
            repo_path: String::new(),
            commit: commit.to_string(),
            branch: "main".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, month, 1, 9, 0, 0).unwrap(),
            status: EventStatus::Pending,
            source: EventSource::PostCommit,
        };
        let (a, b, c) = (event(1, "a", 3), event(2, "b", 1), event(3, "c", 2));

        let split = tempfile::tempdir().unwrap();
        materialize(split.path(), &[a.clone(), b.clone()], 2025, &NoMetadata, "m").unwrap();
        materialize(split.path(), &[c.clone()], 2025, &NoMetadata, "m").unwrap();

        let single = tempfile::tempdir().unwrap();
        materialize(single.path(), &[a, b, c], 2025, &NoMetadata, "m").unwrap();

        assert_eq!(
            fs::read(split.path().join("commits.csv")).unwrap(),
            fs::read(single.path().join("commits.csv")).unwrap()
        );
    }

    #[test]
    fn test_materialize_replaces_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let event = Event {
            id: 9,
            repo_id: RepoId::new("r"),
            repo_path: String::new(),
            commit: "abc".to_string(),
            branch: "main".to_string(),
            timestamp: now(),
            status: EventStatus::Pending,
            source: EventSource::PostCommit,
        };

        materialize(dir.path(), &[event.clone()], 2025, &NoMetadata, "m").unwrap();
        let mut moved = event;
        moved.branch = "release".to_string();
        let result = materialize(dir.path(), &[moved], 2025, &NoMetadata, "m").unwrap();

        assert_eq!(result.exported_ids, vec![9]);
        let rows = data_rows(&dir.path().join("commits.csv"));
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains(",release,"));
    }

    #[test]
    fn test_locked_export_fails() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export");
        let _held = ExportLock::acquire(&export, Duration::ZERO).unwrap();

        let mut storage = SqliteStorage::open_memory().unwrap();
        let transport = FakeTransport::default();
        let state = MemoryStateStore::default();
        let mut exporter = Exporter::new(&mut storage, &transport, &NoMetadata, &state, export, Duration::ZERO)
            .with_lock_timeout(Duration::from_millis(50));

        assert!(matches!(
            exporter.run(forced()),
            Err(Error::ExportLocked { .. })
        ));
        assert!(maybe_export(&mut exporter).is_none());
    }
}
