//! Which identity a repository is tracked under.
//!
//! A repository tracked before it had an `origin` is tracked as
//! `local:<path>`. Once a remote is added its derived id changes, and
//! events stop being recorded until the tracking is moved to the remote id.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{ConfigFile, TRACKED_REPOS_KEY};
use crate::error::{Error, Result};
use crate::git::repo::{origin_url, repo_root};
use crate::model::RepoId;

/// The ids a working tree can be known by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoIdentity {
    pub root: PathBuf,
    /// Id derived from the path alone.
    pub local: RepoId,
    /// Id derived from `origin`, if configured.
    pub remote: Option<RepoId>,
}

impl RepoIdentity {
    /// Resolve the repository containing `dir`.
    ///
    /// # Errors
    ///
    /// Returns `NotInGitRepo` outside a work tree, or `InvalidRepo` if the
    /// origin URL cannot be turned into an id.
    pub fn resolve(dir: &Path) -> Result<Self> {
        let root = repo_root(dir)?;
        let remote = origin_url(&root)
            .map(|url| RepoId::from_remote(&url))
            .transpose()?;
        Ok(Self {
            local: RepoId::from_path(&root),
            remote,
            root,
        })
    }

    /// The id new events are recorded under.
    #[must_use]
    pub fn current(&self) -> &RepoId {
        self.remote.as_ref().unwrap_or(&self.local)
    }
}

/// How a repository relates to the tracked list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackingState {
    /// Tracked under its current id.
    Tracked { id: RepoId },
    /// Tracked under its local id although it now has a remote.
    LocalOnly { local: RepoId, remote: RepoId },
    NotTracked { id: RepoId },
}

/// Where `identity` stands against `tracked`.
#[must_use]
pub fn tracking_state(identity: &RepoIdentity, tracked: &[RepoId]) -> TrackingState {
    let current = identity.current();
    if tracked.contains(current) {
        return TrackingState::Tracked {
            id: current.clone(),
        };
    }
    match &identity.remote {
        Some(remote) if tracked.contains(&identity.local) => TrackingState::LocalOnly {
            local: identity.local.clone(),
            remote: remote.clone(),
        },
        _ => TrackingState::NotTracked {
            id: current.clone(),
        },
    }
}

/// Move tracking from the local id to the remote id in the config file.
///
/// Returns `(local, remote)`.
///
/// # Errors
///
/// Returns `InvalidArgument` if the repository has no remote,
/// `RepoNotTracked` if the local id is not tracked, or an error if the
/// config file cannot be updated.
pub fn adopt_remote(config_path: &Path, identity: &RepoIdentity) -> Result<(RepoId, RepoId)> {
    let remote = identity.remote.clone().ok_or_else(|| {
        Error::InvalidArgument(format!("{} has no origin remote", identity.root.display()))
    })?;
    let local = identity.local.clone();

    ConfigFile::update(config_path, |cfg| {
        if !cfg.remove_from_array(TRACKED_REPOS_KEY, local.as_str()) {
            return Err(Error::RepoNotTracked {
                id: local.to_string(),
            });
        }
        cfg.append_array(TRACKED_REPOS_KEY, remote.as_str());
        Ok(())
    })?;

    Ok((local, remote))
}
