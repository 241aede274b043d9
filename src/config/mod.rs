//! Configuration management.
//!
//! This module resolves where footprint keeps its files and reads the
//! settings the recorder and exporter consume.
//!
//! # Layout
//!
//! - **Database**: `<config dir>/footprint/store.db` (override with `--db` / `FP_DB`)
//! - **Config file**: `~/.fprc` (override with `FP_CONFIG`)
//! - **Export repository**: `<config dir>/footprint/export` unless `export_path` is set

pub mod file;

pub use file::ConfigFile;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};
use crate::model::RepoId;

const APP_DIR: &str = "footprint";

/// Array key listing tracked repository ids.
pub const TRACKED_REPOS_KEY: &str = "trackedRepos";

pub const EXPORT_PATH_KEY: &str = "export_path";
pub const EXPORT_REMOTE_KEY: &str = "export_remote";
pub const EXPORT_INTERVAL_KEY: &str = "export_interval";
pub const EXPORT_LAST_KEY: &str = "export_last";

/// Default minimum time between automatic exports.
pub const DEFAULT_EXPORT_INTERVAL: Duration = Duration::from_secs(3600);

/// Per-user footprint directory under the platform config dir.
#[must_use]
pub fn app_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.config_dir().join(APP_DIR))
}

/// Resolve the database path.
///
/// Priority:
/// 1. `explicit_path` (from `--db`, which also reads `FP_DB`)
/// 2. `<config dir>/footprint/store.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    app_dir().map(|dir| dir.join("store.db"))
}

/// Resolve the config file path: `FP_CONFIG`, else `~/.fprc`.
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("FP_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    directories::BaseDirs::new().map(|b| b.home_dir().join(".fprc"))
}

/// Default export repository location.
#[must_use]
pub fn default_export_dir() -> Option<PathBuf> {
    app_dir().map(|dir| dir.join("export"))
}

/// Expand a leading `~/` against the home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

/// Repositories whose events are recorded.
#[must_use]
pub fn tracked_repos(config: &ConfigFile) -> Vec<RepoId> {
    config
        .array(TRACKED_REPOS_KEY)
        .into_iter()
        .map(RepoId::new)
        .collect()
}

/// Settings the exporter reads from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub export_dir: PathBuf,
    pub remote: Option<String>,
    pub interval: Duration,
}

impl ExportSettings {
    /// Resolve export settings, defaulting anything missing or invalid.
    ///
    /// # Errors
    ///
    /// Returns a config error if no export path is set and no home
    /// directory can be determined.
    pub fn from_config(config: &ConfigFile) -> Result<Self> {
        // `export_repo` is the key older config files used.
        let export_dir = match config
            .get(EXPORT_PATH_KEY)
            .or_else(|| config.get("export_repo"))
            .filter(|p| !p.is_empty())
        {
            Some(path) => expand_home(path),
            None => default_export_dir()
                .ok_or_else(|| Error::Config("cannot determine a default export path".into()))?,
        };

        let remote = config
            .get(EXPORT_REMOTE_KEY)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        let interval = match config.get(EXPORT_INTERVAL_KEY) {
            None => DEFAULT_EXPORT_INTERVAL,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => {
                    warn!(value = raw, "Invalid export_interval, using default");
                    DEFAULT_EXPORT_INTERVAL
                }
            },
        };

        Ok(Self {
            export_dir,
            remote,
            interval,
        })
    }
}
