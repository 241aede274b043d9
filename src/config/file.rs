//! Line-preserving `key=value` config file.
//!
//! Edits touch only the affected lines; comments, blank lines and ordering
//! survive a round trip. Array values are stored one per line as
//! `key[]=value`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::file::atomic_write;
use crate::sync::lock::FileLock;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// An in-memory copy of a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    path: PathBuf,
    lines: Vec<String>,
}

/// Split a line into `(key, value)`; `None` for blanks, comments and junk.
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim().trim_start_matches('\u{feff}');
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

/// Strip an inline comment and surrounding quotes from a value.
fn clean_value(raw: &str) -> &str {
    let value = raw.split_once(" #").map_or(raw, |(v, _)| v).trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

impl ConfigFile {
    /// Read `path`; a missing file is an empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let lines = match std::fs::read_to_string(path) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            lines,
        })
    }

    /// Load, edit and save `path` while holding its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is not obtained in time, or if reading,
    /// `edit`, or writing fails.
    pub fn update<R>(path: &Path, edit: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let lock_path = {
            let mut name = path.file_name().unwrap_or_default().to_os_string();
            name.push(".lock");
            path.with_file_name(name)
        };
        let _lock = FileLock::acquire(&lock_path, LOCK_TIMEOUT)?.ok_or_else(|| {
            Error::Config(format!("{} is locked by another process", path.display()))
        })?;

        let mut config = Self::load(path)?;
        let result = edit(&mut config)?;
        config.save()?;
        Ok(result)
    }

    /// Write the file back atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save(&self) -> Result<()> {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        atomic_write(&self.path, text.as_bytes())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of a scalar key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .filter_map(|line| split_entry(line))
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| clean_value(v))
            .last()
    }

    /// Set a scalar key, keeping any inline comment. Returns `true` if the
    /// key already existed.
    ///
    /// The last occurrence, the one `get` reads, is rewritten; earlier
    /// duplicates are removed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let matches: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| split_entry(line).is_some_and(|(k, _)| k == key))
            .map(|(i, _)| i)
            .collect();

        let Some(&last) = matches.last() else {
            self.lines.push(format!("{key}={value}"));
            return false;
        };

        let comment = split_entry(&self.lines[last])
            .and_then(|(_, old)| old.find(" #").map(|idx| old[idx..].trim().to_string()));
        self.lines[last] = match comment {
            Some(comment) => format!("{key}={value} {comment}"),
            None => format!("{key}={value}"),
        };

        for &i in matches[..matches.len() - 1].iter().rev() {
            self.lines.remove(i);
        }
        true
    }

    /// Remove a scalar key. Returns `true` if it was present.
    pub fn unset(&mut self, key: &str) -> bool {
        let before = self.lines.len();
        self.lines
            .retain(|line| split_entry(line).is_none_or(|(k, _)| k != key));
        self.lines.len() != before
    }

    /// Values of an array key, in file order.
    #[must_use]
    pub fn array(&self, key: &str) -> Vec<&str> {
        let array_key = format!("{key}[]");
        self.lines
            .iter()
            .filter_map(|line| split_entry(line))
            .filter(|(k, v)| *k == array_key && !v.is_empty())
            .map(|(_, v)| v)
            .collect()
    }

    /// Add a value to an array key. Returns `false` if already present.
    pub fn append_array(&mut self, key: &str, value: &str) -> bool {
        if self.array(key).contains(&value) {
            return false;
        }
        self.lines.push(format!("{key}[]={value}"));
        true
    }

    /// Remove a value from an array key. Returns `true` if it was present.
    pub fn remove_from_array(&mut self, key: &str, value: &str) -> bool {
        let array_key = format!("{key}[]");
        let before = self.lines.len();
        self.lines.retain(|line| {
            split_entry(line).is_none_or(|(k, v)| k != array_key || v != value)
        });
        self.lines.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> ConfigFile {
        ConfigFile {
            path: PathBuf::from("/unused"),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    #[test]
    fn test_get_strips_quotes_and_comments() {
        let cfg = config("# footprint\nexport_path = \"/data/export\"\nexport_interval=600 # ten minutes\n");
        assert_eq!(cfg.get("export_path"), Some("/data/export"));
        assert_eq!(cfg.get("export_interval"), Some("600"));
        assert_eq!(cfg.get("missing"), None);
    }

    #[test]
    fn test_set_preserves_other_lines() {
        let mut cfg = config("# header\n\nexport_last=0 # managed\nother=1");
        assert!(cfg.set("export_last", "1700000000"));
        assert!(!cfg.set("export_remote", "git@host:me/log.git"));

        assert_eq!(
            cfg.lines,
            vec![
                "# header",
                "",
                "export_last=1700000000 # managed",
                "other=1",
                "export_remote=git@host:me/log.git",
            ]
        );
    }

    #[test]
    fn test_set_collapses_duplicate_keys() {
        let mut cfg = config("export_last=1\nother=x\nexport_last=2 # latest");
        assert_eq!(cfg.get("export_last"), Some("2"));

        assert!(cfg.set("export_last", "3"));
        assert_eq!(cfg.get("export_last"), Some("3"));
        assert_eq!(cfg.lines, vec!["other=x", "export_last=3 # latest"]);
    }

    #[test]
    fn test_unset() {
        let mut cfg = config("a=1\nb=2\n# a=3");
        assert!(cfg.unset("a"));
        assert!(!cfg.unset("a"));
        assert_eq!(cfg.lines, vec!["b=2", "# a=3"]);
    }

    #[test]
    fn test_arrays() {
        let mut cfg = config("trackedRepos[]=github.com/a/b\nname=x");
        assert!(cfg.append_array("trackedRepos", "local:/tmp/c"));
        assert!(!cfg.append_array("trackedRepos", "github.com/a/b"));
        assert_eq!(cfg.array("trackedRepos"), vec!["github.com/a/b", "local:/tmp/c"]);

        assert!(cfg.remove_from_array("trackedRepos", "github.com/a/b"));
        assert!(!cfg.remove_from_array("trackedRepos", "github.com/a/b"));
        assert_eq!(cfg.array("trackedRepos"), vec!["local:/tmp/c"]);
        assert_eq!(cfg.get("name"), Some("x"));
    }

    #[test]
    fn test_update_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".fprc");
        std::fs::write(&path, "# keep me\nexport_interval=60\n").unwrap();

        ConfigFile::update(&path, |cfg| {
            cfg.set("export_last", "42");
            Ok(())
        })
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "# keep me\nexport_interval=60\nexport_last=42\n");
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ConfigFile::load(&dir.path().join("nope")).unwrap();
        assert_eq!(cfg.get("anything"), None);
        assert!(cfg.array("trackedRepos").is_empty());
    }
}
