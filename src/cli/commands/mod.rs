//! Command implementations.

pub mod activity;
pub mod export;
pub mod record;
pub mod repo;
pub mod version;

use std::path::{Path, PathBuf};

use crate::config::{config_file_path, resolve_db_path, ConfigFile};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;

/// Open the event store, creating it on first use.
pub(crate) fn open_storage(db_path: Option<&PathBuf>) -> Result<SqliteStorage> {
    let path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("cannot determine a database path".into()))?;
    SqliteStorage::open(&path)
}

/// Path of the config file; errors when no home directory is known.
pub(crate) fn config_path() -> Result<PathBuf> {
    config_file_path().ok_or_else(|| Error::Config("cannot determine the config file path".into()))
}

pub(crate) fn load_config() -> Result<(PathBuf, ConfigFile)> {
    let path = config_path()?;
    let config = ConfigFile::load(&path)?;
    Ok((path, config))
}

/// `path`, or the current directory when absent.
pub(crate) fn dir_or_cwd(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(std::env::current_dir()?),
    }
}
