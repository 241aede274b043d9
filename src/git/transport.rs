//! Transport for the export repository.
//!
//! The export repository is an ordinary git work tree holding the CSV files.
//! `Transport` is the seam the export orchestrator drives; `GitTransport`
//! implements it with the `git` binary.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Operations the export orchestrator needs from the export repository.
pub trait Transport {
    /// Create the directory and initialize a repository if needed.
    fn ensure_repo(&self, dir: &Path) -> Result<()>;

    /// Whether an `origin` remote is configured.
    fn has_remote(&self, dir: &Path) -> bool;

    /// Fail if a merge, rebase or cherry-pick is in progress.
    fn check_clean_state(&self, dir: &Path) -> Result<()>;

    /// Bring in remote changes before writing.
    fn pull(&self, dir: &Path) -> Result<()>;

    /// Publish local commits to `origin`.
    fn push(&self, dir: &Path) -> Result<()>;

    /// Stage `files` and commit them. Returns `false` when nothing changed.
    fn commit(&self, dir: &Path, files: &[PathBuf]) -> Result<bool>;

    /// Point `origin` at `url`, adding it if missing.
    fn set_remote(&self, dir: &Path, url: &str) -> Result<()>;
}

/// `Transport` backed by the `git` executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitTransport {
    retry: RetryPolicy,
}

impl GitTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom retry policy for fetch and push.
    #[must_use]
    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self { retry }
    }
}

/// Commit message for an export touching `count` files.
#[must_use]
pub fn commit_message(count: usize) -> String {
    if count == 1 {
        "Export 1 file".to_string()
    } else {
        format!("Export {count} files")
    }
}

/// Name of the operation left in progress in `git_dir`, if any.
fn operation_in_progress(git_dir: &Path) -> Option<&'static str> {
    if git_dir.join("MERGE_HEAD").exists() {
        Some("merge")
    } else if git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists() {
        Some("rebase")
    } else if git_dir.join("CHERRY_PICK_HEAD").exists() {
        Some("cherry-pick")
    } else {
        None
    }
}

impl Transport for GitTransport {
    fn ensure_repo(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }

        if dir.join(".git").exists() {
            return Ok(());
        }

        super::run(dir, &["init", "-q"])?;
        info!(dir = %dir.display(), "Initialized export repository");
        Ok(())
    }

    fn has_remote(&self, dir: &Path) -> bool {
        super::succeeds(dir, &["remote", "get-url", "origin"])
    }

    fn check_clean_state(&self, dir: &Path) -> Result<()> {
        match operation_in_progress(&dir.join(".git")) {
            Some(operation) => Err(Error::DirtyExportRepo {
                operation: operation.to_string(),
                path: dir.to_path_buf(),
            }),
            None => Ok(()),
        }
    }

    fn pull(&self, dir: &Path) -> Result<()> {
        self.retry
            .run("fetch", || super::run(dir, &["fetch", "origin"]).map(drop))?;

        let remote_branches = super::run(dir, &["branch", "-r"]).unwrap_or_default();
        if remote_branches.is_empty() {
            debug!("Remote is empty, skipping pull");
            return Ok(());
        }

        // Rebasing onto an unrelated history would replay every local commit
        // and stop on the first add/add conflict, so merge those instead.
        let upstream = super::remote_head(dir)?;
        let has_local_commits = super::succeeds(dir, &["rev-parse", "--verify", "-q", "HEAD"]);
        if has_local_commits && !super::succeeds(dir, &["merge-base", "HEAD", &upstream]) {
            info!("Remote history is unrelated, merging");
            return super::resolve::merge_unrelated(dir);
        }

        let args = ["pull", "--rebase", "origin", "HEAD"];
        let out = super::output(dir, &args)?;
        if out.status.success() {
            return Ok(());
        }

        if super::combined(&out).contains("unrelated histories") {
            info!("Remote history is unrelated, merging");
            return super::resolve::merge_unrelated(dir);
        }

        if operation_in_progress(&dir.join(".git")) == Some("rebase") {
            let _ = super::run(dir, &["rebase", "--abort"]);
        }
        Err(super::failure(&args, &out))
    }

    fn push(&self, dir: &Path) -> Result<()> {
        self.retry.run("push", || {
            super::run(dir, &["push", "-u", "origin", "HEAD"]).map(drop)
        })
    }

    fn commit(&self, dir: &Path, files: &[PathBuf]) -> Result<bool> {
        if files.is_empty() {
            return Ok(false);
        }

        for file in files {
            let path = file.strip_prefix(dir).unwrap_or(file);
            super::run(dir, &["add", "--", &path.to_string_lossy()])?;
        }

        if super::succeeds(dir, &["diff", "--cached", "--quiet"]) {
            debug!("Nothing staged, skipping commit");
            return Ok(false);
        }

        super::run(dir, &["commit", "-q", "-m", &commit_message(files.len())])?;
        Ok(true)
    }

    fn set_remote(&self, dir: &Path, url: &str) -> Result<()> {
        if self.has_remote(dir) {
            super::run(dir, &["remote", "set-url", "origin", url])?;
        } else {
            super::run(dir, &["remote", "add", "origin", url])?;
        }
        info!(url, "Export remote configured");
        Ok(())
    }
}
