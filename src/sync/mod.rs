//! CSV export operations.
//!
//! This module moves recorded events into a git-tracked export repository:
//!
//! - **CSV**: row format, year routing and version merging
//! - **File**: atomic writes and the disk-space guard
//! - **Lock**: cross-process export and config locks
//! - **State**: when the last export ran
//! - **Export**: the orchestrator tying them together
//!
//! # Example
//!
//! ```ignore
//! use fp::sync::{Exporter, ExportOptions, FileStateStore};
//!
//! let state = FileStateStore::new(config_path);
//! let mut exporter = Exporter::new(&mut storage, &transport, &GitMetadata, &state, export_dir, interval);
//! let report = exporter.run(ExportOptions { force: true, dry_run: false })?;
//! ```

pub mod csv;
mod export;
pub mod file;
pub mod lock;
mod state;
mod types;

pub use export::{machine_name, materialize, maybe_export, Exporter};
pub use file::{atomic_write, write_csv_sorted};
pub use lock::{ExportLock, FileLock};
pub use state::{should_export, ExportState, FileStateStore, MemoryStateStore, StateStore};
pub use types::{ExportOptions, ExportReport, Materialized, SkipReason};
