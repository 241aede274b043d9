//! Commit metadata lookup.
//!
//! Enrichment never fails an export: any problem yields empty metadata and
//! the row is written with what the event itself knows.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

/// Metadata git reports for one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitMetadata {
    pub authored_at: String,
    pub committed_at: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    /// Parent hashes, space separated
    pub parents: String,
    pub subject: String,
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

impl CommitMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Source of commit metadata, swappable in tests.
pub trait MetadataSource {
    /// Metadata for `commit` in the repository at `repo_path`.
    ///
    /// Returns `CommitMetadata::default()` when nothing can be determined.
    fn metadata(&self, repo_path: &Path, commit: &str) -> CommitMetadata;
}

/// Reads metadata with `git log` and `git show --numstat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitMetadata;

const LOG_FORMAT: &str = "--format=%aI%x00%cI%x00%an%x00%ae%x00%cn%x00%ce%x00%P%x00%s";

impl MetadataSource for GitMetadata {
    fn metadata(&self, repo_path: &Path, commit: &str) -> CommitMetadata {
        if commit.is_empty() || commit.starts_with('-') || !repo_path.is_dir() {
            debug!(repo = %repo_path.display(), commit, "Skipping metadata lookup");
            return CommitMetadata::default();
        }

        let log = match super::run(repo_path, &["log", "-1", LOG_FORMAT, commit, "--"]) {
            Ok(log) => log,
            Err(e) => {
                debug!(repo = %repo_path.display(), commit, error = %e, "Metadata lookup failed");
                return CommitMetadata::default();
            }
        };

        let mut meta = parse_log(&log);

        match super::run(repo_path, &["show", "--numstat", "--format=", commit, "--"]) {
            Ok(numstat) => {
                let (files, insertions, deletions) = parse_numstat(&numstat);
                meta.files_changed = files;
                meta.insertions = insertions;
                meta.deletions = deletions;
            }
            Err(e) => debug!(commit, error = %e, "Diff stats unavailable"),
        }

        meta
    }
}

fn parse_log(log: &str) -> CommitMetadata {
    let mut fields = log.split('\0').map(str::to_string);
    let mut next = || fields.next().unwrap_or_default();

    CommitMetadata {
        authored_at: next(),
        committed_at: next(),
        author_name: next(),
        author_email: next(),
        committer_name: next(),
        committer_email: next(),
        parents: next(),
        subject: next(),
        ..CommitMetadata::default()
    }
}

/// Sum `git show --numstat` output into (files, insertions, deletions).
///
/// Binary files report `-` for both counts and add only to the file count.
fn parse_numstat(numstat: &str) -> (u32, u32, u32) {
    let mut totals = (0u32, 0u32, 0u32);
    for line in numstat.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.splitn(3, '\t');
        let added = parts.next().and_then(|n| n.parse::<u32>().ok()).unwrap_or(0);
        let removed = parts.next().and_then(|n| n.parse::<u32>().ok()).unwrap_or(0);
        totals.0 += 1;
        totals.1 = totals.1.saturating_add(added);
        totals.2 = totals.2.saturating_add(removed);
    }
    totals
}
