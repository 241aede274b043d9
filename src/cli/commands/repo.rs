//! Repository tracking commands.

use std::path::{Path, PathBuf};

use colored::Colorize;
use tracing::info;

use crate::config::{tracked_repos, ConfigFile, TRACKED_REPOS_KEY};
use crate::error::{Error, Result};
use crate::model::RepoId;
use crate::tracking::{self, tracking_state, RepoIdentity, TrackingState};

/// Identity of the repository containing `dir`.
fn identify(dir: &Path) -> Result<(PathBuf, RepoId)> {
    let identity = RepoIdentity::resolve(dir)?;
    let id = identity.current().clone();
    Ok((identity.root, id))
}

/// Execute the track command.
///
/// # Errors
///
/// Returns an error if `path` is not inside a git repository or the config
/// file cannot be updated.
pub fn track(path: Option<&Path>, json: bool) -> Result<()> {
    let (root, id) = identify(&super::dir_or_cwd(path)?)?;
    let added = ConfigFile::update(&super::config_path()?, |cfg| {
        Ok(cfg.append_array(TRACKED_REPOS_KEY, id.as_str()))
    })?;
    if added {
        info!(repo = %id, "Tracking repository");
    }

    if json {
        let output = serde_json::json!({
            "repo": id,
            "path": root.display().to_string(),
            "added": added,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if added {
        println!("{} {id}", "Tracking".green());
    } else {
        println!("Already tracking {id}");
    }
    Ok(())
}

/// Execute the untrack command.
///
/// Unexported events of the repository become orphaned and are purged by
/// the next export.
///
/// # Errors
///
/// Returns `RepoNotTracked` if the repository was not tracked.
pub fn untrack(path: Option<&Path>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (_, id) = identify(&super::dir_or_cwd(path)?)?;
    let removed = ConfigFile::update(&super::config_path()?, |cfg| {
        Ok(cfg.remove_from_array(TRACKED_REPOS_KEY, id.as_str()))
    })?;
    if !removed {
        return Err(Error::RepoNotTracked {
            id: id.to_string(),
        });
    }

    let mut storage = super::open_storage(db_path)?;
    let orphaned = storage.mark_repo_orphaned(&id)?;
    info!(repo = %id, orphaned, "Stopped tracking repository");

    if json {
        let output = serde_json::json!({
            "repo": id,
            "orphaned": orphaned,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Stopped tracking {id}");
        if orphaned > 0 {
            println!("  {orphaned} pending event(s) will be discarded on the next export");
        }
    }
    Ok(())
}

/// Execute the repos command.
///
/// # Errors
///
/// Returns an error if the config file cannot be read.
pub fn list(json: bool) -> Result<()> {
    let (_, config) = super::load_config()?;
    let repos = tracked_repos(&config);

    if json {
        let output = serde_json::json!({
            "repos": repos,
            "count": repos.len(),
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if repos.is_empty() {
        println!("No repositories tracked. Run `fp track` inside one.");
        return Ok(());
    }
    for repo in &repos {
        let kind = if repo.is_local() { "local" } else { "remote" };
        println!("{repo} {}", format!("({kind})").dimmed());
    }
    Ok(())
}

/// Execute the repo status command.
///
/// # Errors
///
/// Returns an error if `path` is not inside a git repository or the config
/// file cannot be read.
pub fn status(path: Option<&Path>, json: bool) -> Result<()> {
    let identity = RepoIdentity::resolve(&super::dir_or_cwd(path)?)?;
    let (_, config) = super::load_config()?;
    let state = tracking_state(&identity, &tracked_repos(&config));

    if json {
        let output = serde_json::json!({
            "path": identity.root.display().to_string(),
            "tracking": state,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    match state {
        TrackingState::Tracked { id } => println!("{} {id}", "tracked".green()),
        TrackingState::LocalOnly { local, remote } => {
            println!("{} {local}", "tracked".green());
            println!("{} {remote}", "remote detected".yellow());
            println!("Run `fp repo adopt-remote` to record events under the remote id.");
        }
        TrackingState::NotTracked { id } => println!("{} {id}", "not tracked".dimmed()),
    }
    Ok(())
}

/// Execute the repo adopt-remote command.
///
/// # Errors
///
/// Returns an error if the repository has no remote, its local id is not
/// tracked, or the config file cannot be updated.
pub fn adopt_remote(path: Option<&Path>, json: bool) -> Result<()> {
    let identity = RepoIdentity::resolve(&super::dir_or_cwd(path)?)?;
    let (local, remote) = tracking::adopt_remote(&super::config_path()?, &identity)?;
    info!(local = %local, remote = %remote, "Adopted remote identity");

    if json {
        let output = serde_json::json!({
            "from": local,
            "to": remote,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Adopted identity:\n  {local}\n  -> {remote}");
    }
    Ok(())
}
