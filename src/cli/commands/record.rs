//! Record command implementation.
//!
//! Runs from git hooks, so failures are logged and never surface as a
//! non-zero exit that could interrupt the user's git operation.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::{tracked_repos, ExportSettings};
use crate::error::{Error, Result};
use crate::git::{GitMetadata, GitTransport};
use crate::model::EventSource;
use crate::record::record_current;
use crate::sync::{maybe_export, Exporter, FileStateStore};

/// Execute the record command.
///
/// # Errors
///
/// Never returns an error; the signature matches the other commands.
pub fn execute(source: &str, no_export: bool, db_path: Option<&PathBuf>) -> Result<()> {
    if let Err(e) = record(source, no_export, db_path) {
        match e {
            Error::NotInGitRepo { .. } => debug!(error = %e, "Nothing to record"),
            _ => warn!(error = %e, "Could not record event"),
        }
    }
    Ok(())
}

fn record(source: &str, no_export: bool, db_path: Option<&PathBuf>) -> Result<()> {
    let source: EventSource = source.parse()?;
    let (config_path, config) = super::load_config()?;
    let tracked = tracked_repos(&config);
    if tracked.is_empty() {
        debug!("No tracked repositories");
        return Ok(());
    }

    let cwd = std::env::current_dir()?;
    let mut storage = super::open_storage(db_path)?;
    if record_current(&mut storage, &tracked, source, &cwd)?.is_none() || no_export {
        return Ok(());
    }

    let settings = ExportSettings::from_config(&config)?;
    let transport = GitTransport::new();
    let state = FileStateStore::new(config_path);
    let mut exporter = Exporter::new(
        &mut storage,
        &transport,
        &GitMetadata,
        &state,
        settings.export_dir,
        settings.interval,
    );
    maybe_export(&mut exporter);
    Ok(())
}
