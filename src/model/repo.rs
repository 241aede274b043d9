//! Repository identity.
//!
//! A `RepoId` names a repository independently of where it is checked out,
//! so the same project cloned on two machines exports under one `repo` value.

use std::fmt;
use std::path::Path;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const LOCAL_PREFIX: &str = "local:";

/// Stable repository identifier, e.g. `github.com/acme/widgets` or
/// `local:/home/me/scratch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    /// Wrap an already-derived identifier (e.g. read from config or storage).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an identifier from the `origin` remote URL, or from the
    /// repository path when there is no remote.
    pub fn derive(remote_url: Option<&str>, repo_path: &Path) -> Result<Self> {
        match remote_url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => Self::from_remote(url),
            None => Ok(Self::from_path(repo_path)),
        }
    }

    /// Derive an identifier from a remote URL.
    pub fn from_remote(url: &str) -> Result<Self> {
        let url = url.trim();

        if let Some(path) = url.strip_prefix("file://") {
            return Ok(Self(format!("{LOCAL_PREFIX}{}", trim_repo_suffix(path))));
        }

        let id = if let Some(rest) = url.strip_prefix("ssh://") {
            let rest = rest.split_once('@').map_or(rest, |(_, host)| host);
            let (authority, path) = rest
                .split_once('/')
                .ok_or_else(|| Error::InvalidRepo(url.to_string()))?;
            let host = authority.split_once(':').map_or(authority, |(host, _)| host);
            format!("{host}/{path}")
        } else if let Some(rest) = ["https://", "http://", "git://"]
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
        {
            rest.split_once('@').map_or(rest, |(_, host)| host).to_string()
        } else if !url.contains("://") && url.contains('@') && url.contains(':') {
            // scp-like syntax: git@host:owner/repo.git
            let rest = url.split_once('@').map_or(url, |(_, rest)| rest);
            let (host, path) = rest
                .split_once(':')
                .ok_or_else(|| Error::InvalidRepo(url.to_string()))?;
            format!("{host}/{path}")
        } else {
            return Err(Error::InvalidRepo(format!("unsupported remote URL: {url}")));
        };

        let id = trim_repo_suffix(&id).to_lowercase();
        if id.is_empty() || id.contains("..") || id.contains('\0') {
            return Err(Error::InvalidRepo(format!("unsafe remote URL: {url}")));
        }
        Ok(Self(id))
    }

    /// Identifier for a repository without a remote.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let text = absolute.to_string_lossy();
        let trimmed = if text.len() > 1 {
            text.trim_end_matches('/')
        } else {
            &text
        };
        Self(format!("{LOCAL_PREFIX}{trimmed}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier came from a local path rather than a remote.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_PREFIX)
    }
}

fn trim_repo_suffix(s: &str) -> &str {
    let s = s.trim_end_matches('/');
    s.strip_suffix(".git").unwrap_or(s).trim_end_matches('/')
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToSql for RepoId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for RepoId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(|s| Self(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn id(url: &str) -> String {
        RepoId::from_remote(url).unwrap().0
    }

    #[test]
    fn test_scp_style_remote() {
        assert_eq!(id("git@github.com:Acme/Widgets.git"), "github.com/acme/widgets");
        assert_eq!(id("git@gitlab.com:group/sub/proj"), "gitlab.com/group/sub/proj");
    }

    #[test]
    fn test_https_and_git_remotes() {
        assert_eq!(id("https://github.com/acme/widgets.git"), "github.com/acme/widgets");
        assert_eq!(id("https://github.com/acme/widgets/"), "github.com/acme/widgets");
        assert_eq!(id("http://example.org/Team/Repo"), "example.org/team/repo");
        assert_eq!(id("git://example.org/team/repo.git"), "example.org/team/repo");
        assert_eq!(
            id("https://user@bitbucket.org/team/repo.git"),
            "bitbucket.org/team/repo"
        );
    }

    #[test]
    fn test_ssh_url_drops_user_and_port() {
        assert_eq!(
            id("ssh://git@example.com:2222/team/repo.git"),
            "example.com/team/repo"
        );
        assert_eq!(id("ssh://example.com/team/repo"), "example.com/team/repo");
    }

    #[test]
    fn test_file_url_is_local() {
        let repo = RepoId::from_remote("file:///srv/git/repo.git").unwrap();
        assert_eq!(repo.as_str(), "local:/srv/git/repo");
        assert!(repo.is_local());
    }

    #[test]
    fn test_rejects_traversal_and_unknown_scheme() {
        assert!(RepoId::from_remote("https://example.com/../etc").is_err());
        assert!(RepoId::from_remote("git@host:a/..").is_err());
        assert!(RepoId::from_remote("ftp://example.com/repo").is_err());
        assert!(RepoId::from_remote("just-a-name").is_err());
    }

    #[test]
    fn test_no_remote_uses_path() {
        let repo = RepoId::derive(None, &PathBuf::from("/home/dev/project/")).unwrap();
        assert_eq!(repo.as_str(), "local:/home/dev/project");

        let repo = RepoId::derive(Some("  "), &PathBuf::from("/tmp/x")).unwrap();
        assert_eq!(repo.as_str(), "local:/tmp/x");
    }

    #[test]
    fn test_remote_wins_over_path() {
        let repo = RepoId::derive(
            Some("git@github.com:acme/widgets.git"),
            &PathBuf::from("/somewhere/else"),
        )
        .unwrap();
        assert_eq!(repo.as_str(), "github.com/acme/widgets");
        assert!(!repo.is_local());
    }
}
