//! Persisted exporter state.
//!
//! The only state carried between runs is when the last export finished.
//! It lives behind `StateStore` so runs can be tested without touching the
//! user's config file.

use std::cell::Cell;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::config::{ConfigFile, EXPORT_LAST_KEY};
use crate::error::Result;

/// State carried between export runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportState {
    /// Unix seconds of the last completed export; 0 if never.
    pub last_export: i64,
}

/// Whether enough time has passed since the last export.
#[must_use]
pub fn should_export(state: &ExportState, interval: Duration, now: i64) -> bool {
    let interval = i64::try_from(interval.as_secs()).unwrap_or(i64::MAX);
    now.saturating_sub(state.last_export) >= interval
}

/// Where `ExportState` is loaded from and saved to.
pub trait StateStore {
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn load(&self) -> Result<ExportState>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn save(&self, state: &ExportState) -> Result<()>;
}

/// State kept as `export_last` in the config file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<ExportState> {
        let config = ConfigFile::load(&self.path)?;
        let last_export = match config.get(EXPORT_LAST_KEY) {
            None => 0,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = raw, "Invalid export_last, treating as never exported");
                0
            }),
        };
        Ok(ExportState { last_export })
    }

    fn save(&self, state: &ExportState) -> Result<()> {
        ConfigFile::update(&self.path, |config| {
            config.set(EXPORT_LAST_KEY, &state.last_export.to_string());
            Ok(())
        })
    }
}

/// In-memory state, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Cell<ExportState>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new(state: ExportState) -> Self {
        Self {
            state: Cell::new(state),
        }
    }

    #[must_use]
    pub fn get(&self) -> ExportState {
        self.state.get()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<ExportState> {
        Ok(self.state.get())
    }

    fn save(&self, state: &ExportState) -> Result<()> {
        self.state.set(*state);
        Ok(())
    }
}
