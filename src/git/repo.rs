//! Queries against the working tree a hook fired in.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Top-level directory of the repository containing `dir`.
///
/// # Errors
///
/// Returns `NotInGitRepo` when `dir` is not inside a work tree.
pub fn repo_root(dir: &Path) -> Result<PathBuf> {
    super::run(dir, &["rev-parse", "--show-toplevel"])
        .map(PathBuf::from)
        .map_err(|_| Error::NotInGitRepo {
            path: dir.to_path_buf(),
        })
}

/// URL of the `origin` remote, if one is configured.
#[must_use]
pub fn origin_url(root: &Path) -> Option<String> {
    super::run(root, &["remote", "get-url", "origin"])
        .ok()
        .filter(|url| !url.is_empty())
}

/// Full hash of `HEAD`.
///
/// # Errors
///
/// Returns an error when `HEAD` does not resolve (e.g. no commits yet).
pub fn head_commit(root: &Path) -> Result<String> {
    super::run(root, &["rev-parse", "HEAD"])
}

/// Current branch name; `HEAD` when detached, empty if unknown.
#[must_use]
pub fn current_branch(root: &Path) -> String {
    super::run(root, &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{git, git_available, init_repo};

    #[test]
    fn test_repo_queries() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work");
        let head = init_repo(&root);
        std::fs::create_dir_all(root.join("nested")).unwrap();

        let found = repo_root(&root.join("nested")).unwrap();
        assert_eq!(
            found.canonicalize().unwrap(),
            root.canonicalize().unwrap()
        );
        assert_eq!(head_commit(&root).unwrap(), head);
        assert_eq!(current_branch(&root), "main");
        assert_eq!(origin_url(&root), None);

        git(&root, &["remote", "add", "origin", "git@github.com:acme/widgets.git"]);
        assert_eq!(
            origin_url(&root).as_deref(),
            Some("git@github.com:acme/widgets.git")
        );
    }

    #[test]
    fn test_outside_repo() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = repo_root(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotInGitRepo { .. }));
    }
}
