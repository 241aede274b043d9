//! Event ingestion from git hooks.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::git::repo::{current_branch, head_commit};
use crate::model::{EventSource, NewEvent, RepoId};
use crate::storage::SqliteStorage;
use crate::tracking::{tracking_state, RepoIdentity, TrackingState};

/// Record `HEAD` of the repository containing `cwd`.
///
/// Returns the event id, or `None` when the repository is not in `tracked`.
///
/// # Errors
///
/// Returns an error if `cwd` is not inside a git repository, `HEAD` does not
/// resolve, or the insert fails.
pub fn record_current(
    storage: &mut SqliteStorage,
    tracked: &[RepoId],
    source: EventSource,
    cwd: &Path,
) -> Result<Option<i64>> {
    let identity = RepoIdentity::resolve(cwd)?;
    let repo_id = match tracking_state(&identity, tracked) {
        TrackingState::Tracked { id } => id,
        TrackingState::LocalOnly { local, remote } => {
            warn!(
                local = %local,
                remote = %remote,
                "Repository is tracked under its local id but now has a remote; run `fp repo adopt-remote`"
            );
            return Ok(None);
        }
        TrackingState::NotTracked { id } => {
            debug!(repo = %id, "Repository not tracked, skipping");
            return Ok(None);
        }
    };
    let root = identity.root;

    let event = NewEvent {
        repo_id,
        repo_path: root.to_string_lossy().into_owned(),
        commit: head_commit(&root)?,
        branch: current_branch(&root),
        timestamp: Utc::now(),
        source,
    };
    let id = storage.insert_event(&event)?;
    debug!(id, repo = %event.repo_id, commit = %event.commit, source = %source, "Event recorded");
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::git::test_support::{git, git_available, init_repo};

    #[test]
    fn test_records_tracked_repo_once() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work");
        let head = init_repo(&root);
        git(&root, &["remote", "add", "origin", "git@github.com:Acme/Widgets.git"]);

        let tracked = vec![RepoId::new("github.com/acme/widgets")];
        let mut storage = SqliteStorage::open_memory().unwrap();

        let first = record_current(&mut storage, &tracked, EventSource::PostCommit, &root)
            .unwrap()
            .unwrap();
        let again = record_current(&mut storage, &tracked, EventSource::PostCommit, &root)
            .unwrap()
            .unwrap();
        assert_eq!(first, again);

        let pending = storage.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].commit, head);
        assert_eq!(pending[0].branch, "main");
    }

    #[test]
    fn test_untracked_repo_is_ignored() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work");
        init_repo(&root);

        let mut storage = SqliteStorage::open_memory().unwrap();
        let id = record_current(&mut storage, &[], EventSource::Manual, &root).unwrap();
        assert_eq!(id, None);
        assert_eq!(storage.count_by_status().unwrap().total(), 0);
    }

    #[test]
    fn test_local_id_stops_matching_once_remote_added() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work");
        init_repo(&root);
        let tracked = vec![RepoIdentity::resolve(&root).unwrap().local];
        let mut storage = SqliteStorage::open_memory().unwrap();

        assert!(record_current(&mut storage, &tracked, EventSource::Manual, &root)
            .unwrap()
            .is_some());

        git(&root, &["remote", "add", "origin", "git@github.com:acme/widgets.git"]);
        let id = record_current(&mut storage, &tracked, EventSource::PostCommit, &root).unwrap();
        assert_eq!(id, None);
        assert_eq!(storage.count_by_status().unwrap().total(), 1);
    }

    #[test]
    fn test_outside_repo_errors() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut storage = SqliteStorage::open_memory().unwrap();
        let result = record_current(&mut storage, &[], EventSource::Manual, dir.path());
        assert!(matches!(result, Err(Error::NotInGitRepo { .. })));
    }
}
