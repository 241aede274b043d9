//! Git plumbing.
//!
//! Everything here shells out to the `git` binary:
//!
//! - [`repo`] - queries against a working tree (root, origin, HEAD)
//! - [`metadata`] - commit metadata for export rows
//! - [`transport`] - the export repository's fetch/pull/commit/push cycle
//! - [`resolve`] - automatic merge of divergent CSV histories

pub mod metadata;
pub mod repo;
pub mod resolve;
pub mod transport;

use std::path::Path;
use std::process::{Command, Output};

use crate::error::{Error, Result};

pub use metadata::{CommitMetadata, GitMetadata, MetadataSource};
pub use transport::{GitTransport, Transport};

/// Build a `git` command rooted at `dir`.
///
/// Prompts are disabled so a hook never blocks waiting for credentials.
fn command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_MERGE_AUTOEDIT", "no");
    cmd
}

/// Run git and return its raw output, whatever the exit status.
fn output(dir: &Path, args: &[&str]) -> Result<Output> {
    command(dir, args).output().map_err(|e| Error::Git {
        command: args.first().copied().unwrap_or_default().to_string(),
        message: if e.kind() == std::io::ErrorKind::NotFound {
            "git executable not found".to_string()
        } else {
            e.to_string()
        },
    })
}

/// Run git and return trimmed stdout, failing on a non-zero exit.
fn run(dir: &Path, args: &[&str]) -> Result<String> {
    let out = output(dir, args)?;
    if out.status.success() {
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    } else {
        Err(failure(args, &out))
    }
}

/// Run git and report only whether it exited successfully.
fn succeeds(dir: &Path, args: &[&str]) -> bool {
    output(dir, args).is_ok_and(|out| out.status.success())
}

/// The commit `origin/HEAD` names, as a ref usable in merges.
///
/// A plain fetch does not create `origin/HEAD`, so it is set from the remote
/// on first use. Falls back to `FETCH_HEAD`.
fn remote_head(dir: &Path) -> Result<String> {
    const ORIGIN_HEAD: &str = "origin/HEAD";
    if succeeds(dir, &["rev-parse", "--verify", "-q", ORIGIN_HEAD]) {
        return Ok(ORIGIN_HEAD.to_string());
    }
    if succeeds(dir, &["remote", "set-head", "origin", "--auto"])
        && succeeds(dir, &["rev-parse", "--verify", "-q", ORIGIN_HEAD])
    {
        return Ok(ORIGIN_HEAD.to_string());
    }
    run(dir, &["rev-parse", "--verify", "FETCH_HEAD"]).map(|_| "FETCH_HEAD".to_string())
}

/// stdout and stderr of a finished command, joined.
fn combined(out: &Output) -> String {
    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));
    text
}

fn failure(args: &[&str], out: &Output) -> Error {
    let message = combined(out).trim().to_string();
    Error::Git {
        command: args.join(" "),
        message: if message.is_empty() {
            format!("exited with {}", out.status)
        } else {
            message
        },
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::process::Command;

    /// Whether a usable `git` binary is on PATH.
    pub fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    pub fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .expect("git should run");
        assert!(
            out.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    /// Repo-local identity so commits work without global config.
    pub fn configure_identity(dir: &Path) {
        git(dir, &["config", "user.name", "Test User"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
    }

    /// A fresh repository with one commit on `main`.
    pub fn init_repo(dir: &Path) -> String {
        std::fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "-q", "-b", "main"]);
        configure_identity(dir);
        std::fs::write(dir.join("README"), "hello\n").unwrap();
        git(dir, &["add", "README"]);
        git(dir, &["commit", "-q", "-m", "Initial commit"]);
        git(dir, &["rev-parse", "HEAD"])
    }

    /// A bare repository usable as `origin`.
    pub fn init_bare(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "-q", "--bare"]);
    }
}
