//! Atomic file operations for the export repository.
//!
//! Export files are never written in place:
//! - Content goes to a sibling temp file, which is flushed and synced
//! - The temp file is renamed over the target
//! - On any error the temp file is removed and the original is untouched

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::sync::csv::{self, RowMap};

/// Bytes budgeted per CSV row when estimating the size of a write.
const BYTES_PER_ROW: u64 = 200;

/// Fixed allowance for the header and file overhead.
const OVERHEAD_BYTES: u64 = 1000;

/// Write `content` to `path` atomically.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    atomic_write_with(path, |writer| {
        writer.write_all(content)?;
        Ok(())
    })
}

/// Write to `path` atomically, producing content through `fill`.
///
/// If `fill` fails, the temp file is removed and `path` keeps its old
/// content.
///
/// # Errors
///
/// Returns the error from `fill` or from any file operation.
pub fn atomic_write_with<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    let result = write_temp(&temp_path, fill)
        .and_then(|()| fs::rename(&temp_path, path).map_err(Error::from));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_temp<F>(temp_path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file = create_private(temp_path)?;
    let mut writer = BufWriter::new(file);
    fill(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Create (or truncate) a file readable only by its owner.
fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

/// Estimated bytes needed to write `rows` rows.
#[must_use]
pub fn estimate_size(rows: usize) -> u64 {
    (rows as u64).saturating_mul(BYTES_PER_ROW) + OVERHEAD_BYTES
}

/// Refuse to write when `dir` has less than twice `estimated` bytes free.
///
/// When free space cannot be determined the check passes.
///
/// # Errors
///
/// Returns `InsufficientDiskSpace` naming the required and available sizes.
pub fn check_disk_space(dir: &Path, estimated: u64) -> Result<()> {
    match fs2::available_space(dir) {
        Ok(available) => ensure_space(estimated, available),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Could not check disk space");
            Ok(())
        }
    }
}

fn ensure_space(estimated: u64, available: u64) -> Result<()> {
    let needed = estimated.saturating_mul(2);
    if available < needed {
        return Err(Error::InsufficientDiskSpace { needed, available });
    }
    Ok(())
}

/// Write an export file: sorted rows, disk guard, atomic replace.
///
/// # Errors
///
/// Returns an error if space is short or any write step fails.
pub fn write_csv_sorted(path: &Path, rows: &RowMap) -> Result<()> {
    let content = csv::render(rows)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    check_disk_space(dir, estimate_size(rows.len()))?;

    atomic_write(path, &content)
}
