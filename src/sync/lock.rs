//! Cross-process advisory locks.
//!
//! Two exports touching the same repository at once would race on the CSV
//! files and the git index, and two writers of the config file would lose
//! each other's edits. Both are serialized with an exclusive advisory lock
//! on a side file; the OS drops the lock if its holder dies, so a crashed
//! run never wedges later ones.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use fs2::FileExt;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// How long an export waits for a running one to finish.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// A lock file untouched for this long belonged to a run that died.
pub const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

const EXPORT_LOCK_FILE: &str = ".footprint-export.lock";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusive lock on a file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Try to lock `path` until `timeout` passes.
    ///
    /// Returns `Ok(None)` if another process still holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or written.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if file.try_lock_exclusive().is_ok() {
                let mut lock = Self {
                    file,
                    path: path.to_path_buf(),
                };
                lock.stamp()?;
                return Ok(Some(lock));
            }

            if start.elapsed() >= timeout {
                return Ok(None);
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Record the holder's pid, noting when a previous holder left it stale.
    fn stamp(&mut self) -> Result<()> {
        let metadata = self.file.metadata()?;
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        if metadata.len() > 0 && age.is_some_and(|age| age >= STALE_AFTER) {
            info!(path = %self.path.display(), "Reclaiming stale lock");
        }

        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        writeln!(self.file, "{}", std::process::id())?;
        self.file.sync_all()?;

        debug!(path = %self.path.display(), "Lock acquired");
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// The lock held for the duration of an export run.
#[derive(Debug)]
pub struct ExportLock {
    lock: FileLock,
}

impl ExportLock {
    /// Lock file location for an export directory: a sibling of it.
    #[must_use]
    pub fn path_for(export_dir: &Path) -> PathBuf {
        export_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(export_dir)
            .join(EXPORT_LOCK_FILE)
    }

    /// Acquire the lock for `export_dir`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ExportLocked` if another process still holds the lock when
    /// the timeout expires.
    pub fn acquire(export_dir: &Path, timeout: Duration) -> Result<Self> {
        let path = Self::path_for(export_dir);
        match FileLock::acquire(&path, timeout)? {
            Some(lock) => Ok(Self { lock }),
            None => Err(Error::ExportLocked {
                path,
                waited: timeout,
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.lock.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_is_sibling_of_export_dir() {
        let path = ExportLock::path_for(Path::new("/home/me/.config/footprint/export"));
        assert_eq!(path, Path::new("/home/me/.config/footprint/.footprint-export.lock"));
    }

    #[test]
    fn test_second_holder_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export");

        let held = ExportLock::acquire(&export, Duration::from_millis(100)).unwrap();
        let contents = fs::read_to_string(held.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        let err = ExportLock::acquire(&export, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, Error::ExportLocked { .. }));

        drop(held);
        assert!(ExportLock::acquire(&export, Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn test_file_lock_reports_contention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.lock");

        let held = FileLock::acquire(&path, Duration::ZERO).unwrap();
        assert!(held.is_some());
        assert!(FileLock::acquire(&path, Duration::ZERO).unwrap().is_none());
    }
}
