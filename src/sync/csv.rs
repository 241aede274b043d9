//! CSV records for the export repository.
//!
//! Every export file shares one header. Rows are keyed by `(repo, commit)`;
//! a later write for the same key replaces the earlier row.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use tracing::warn;

use crate::error::{Error, Result};
use crate::git::metadata::CommitMetadata;
use crate::model::Event;

const COLUMNS: usize = 16;

/// Column names, in file order.
pub const HEADER: [&str; COLUMNS] = [
    "authored_at",
    "repo",
    "branch",
    "commit",
    "subject",
    "author",
    "author_email",
    "files",
    "additions",
    "deletions",
    "parents",
    "committer",
    "committer_email",
    "committed_at",
    "source",
    "machine",
];

const AUTHORED_AT_COL: usize = 0;
const REPO_COL: usize = 1;
const COMMIT_COL: usize = 3;

/// File receiving events from the current year.
pub const ACTIVE_FILE: &str = "commits.csv";

/// Path of the export file an event timestamp belongs to.
///
/// Events from `current_year` go to `commits.csv`; anything else goes to
/// `commits-<year>.csv`.
#[must_use]
pub fn csv_path_for(export_dir: &Path, timestamp: &DateTime<Utc>, current_year: i32) -> PathBuf {
    let year = timestamp.year();
    if year == current_year {
        export_dir.join(ACTIVE_FILE)
    } else {
        export_dir.join(format!("commits-{year}.csv"))
    }
}

/// Identity of a row: `(repo, commit)`.
pub type RowKey = (String, String);

/// One exported row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub authored_at: String,
    pub repo: String,
    pub branch: String,
    pub commit: String,
    pub subject: String,
    pub author: String,
    pub author_email: String,
    pub files: u32,
    pub additions: u32,
    pub deletions: u32,
    pub parents: String,
    pub committer: String,
    pub committer_email: String,
    pub committed_at: String,
    pub source: String,
    pub machine: String,
}

impl ExportRecord {
    /// Build a row from a stored event and its (possibly empty) metadata.
    #[must_use]
    pub fn build(event: &Event, meta: &CommitMetadata, machine: &str) -> Self {
        let authored_at = if meta.authored_at.is_empty() {
            event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        } else {
            meta.authored_at.clone()
        };

        Self {
            authored_at,
            repo: event.repo_id.to_string(),
            branch: event.branch.clone(),
            commit: event.commit.clone(),
            subject: sanitize_subject(&meta.subject),
            author: meta.author_name.clone(),
            author_email: meta.author_email.clone(),
            files: meta.files_changed,
            additions: meta.insertions,
            deletions: meta.deletions,
            parents: meta.parents.split_whitespace().collect::<Vec<_>>().join(","),
            committer: meta.committer_name.clone(),
            committer_email: meta.committer_email.clone(),
            committed_at: meta.committed_at.clone(),
            source: event.source.to_string(),
            machine: machine.to_string(),
        }
    }

    #[must_use]
    pub fn key(&self) -> RowKey {
        (self.repo.clone(), self.commit.clone())
    }

    /// Fields in header order.
    #[must_use]
    pub fn into_row(self) -> Vec<String> {
        vec![
            self.authored_at,
            self.repo,
            self.branch,
            self.commit,
            self.subject,
            self.author,
            self.author_email,
            self.files.to_string(),
            self.additions.to_string(),
            self.deletions.to_string(),
            self.parents,
            self.committer,
            self.committer_email,
            self.committed_at,
            self.source,
            self.machine,
        ]
    }
}

/// Single-line subject: newlines become spaces, carriage returns vanish.
#[must_use]
pub fn sanitize_subject(subject: &str) -> String {
    subject
        .chars()
        .filter(|&c| c != '\r')
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Where each `HEADER` column sits in a file's rows.
struct Layout {
    columns: [Option<usize>; COLUMNS],
    /// Rows shorter than this lack a key field.
    min_fields: usize,
}

impl Layout {
    /// The file's columns are `HEADER`, in order.
    fn canonical() -> Self {
        let mut columns = [None; COLUMNS];
        for (i, col) in columns.iter_mut().enumerate() {
            *col = Some(i);
        }
        Self {
            columns,
            min_fields: REPO_COL.max(COMMIT_COL) + 1,
        }
    }

    fn from_header(header: &csv::StringRecord, origin: &str) -> Self {
        let position = |name: &str| header.iter().position(|col| col.trim() == name);
        let (Some(repo), Some(commit)) = (position("repo"), position("commit")) else {
            warn!(file = origin, "CSV header missing repo/commit columns, using default positions");
            return Self::canonical();
        };

        let mut columns = [None; COLUMNS];
        for (col, name) in columns.iter_mut().zip(HEADER) {
            *col = position(name);
        }
        Self {
            columns,
            min_fields: repo.max(commit) + 1,
        }
    }

    /// Fields of `record` in `HEADER` order.
    fn normalize(&self, record: &csv::StringRecord) -> Vec<String> {
        self.columns
            .iter()
            .copied()
            .map(|col| {
                col.and_then(|i| record.get(i))
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }
}

/// Rows of one export file, keyed by `(repo, commit)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMap {
    rows: HashMap<RowKey, Vec<String>>,
}

impl RowMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an export file. A missing file is an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };

        let mut map = Self::new();
        map.merge_from(&content, &path.display().to_string())?;
        Ok(map)
    }

    /// Parse CSV text, e.g. one side of a conflicted file.
    ///
    /// Malformed rows are skipped; unreadable input yields an empty map.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut map = Self::new();
        if let Err(e) = map.merge_from(content.as_bytes(), "<input>") {
            warn!(error = %e, "Could not parse CSV content");
        }
        map
    }

    /// Read rows from `input` into this map, replacing rows with equal keys.
    ///
    /// Fields are placed into `HEADER` order by column name. Columns the file
    /// lacks are left blank and columns `HEADER` lacks are dropped.
    fn merge_from(&mut self, input: &[u8], origin: &str) -> Result<()> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut records = reader.records();
        let layout = match records.next() {
            None => return Ok(()),
            Some(Ok(header)) => Layout::from_header(&header, origin),
            Some(Err(e)) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(Error::Csv(e)),
            Some(Err(e)) => {
                warn!(file = origin, error = %e, "Unreadable CSV header, using default positions");
                Layout::canonical()
            }
        };

        for result in records {
            let record = match result {
                Ok(record) => record,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(Error::Csv(e)),
                Err(e) => {
                    let line = e.position().map_or(0, csv::Position::line);
                    warn!(file = origin, line, error = %e, "Skipping unreadable CSV row");
                    continue;
                }
            };

            if record.len() < layout.min_fields {
                let line = record.position().map_or(0, csv::Position::line);
                warn!(
                    file = origin,
                    line,
                    fields = record.len(),
                    expected = layout.min_fields,
                    "Skipping malformed CSV row"
                );
                continue;
            }

            let row = layout.normalize(&record);
            let key = (row[REPO_COL].clone(), row[COMMIT_COL].clone());
            self.rows.insert(key, row);
        }

        Ok(())
    }

    /// Insert or replace a record.
    pub fn upsert(&mut self, record: ExportRecord) {
        self.rows.insert(record.key(), record.into_row());
    }

    /// Overlay `other` onto this map; `other` wins on key collisions.
    pub fn extend(&mut self, other: Self) {
        self.rows.extend(other.rows);
    }

    #[must_use]
    pub fn get(&self, repo: &str, commit: &str) -> Option<&[String]> {
        self.rows
            .get(&(repo.to_string(), commit.to_string()))
            .map(Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows ordered by authored time, ties broken by key.
    ///
    /// The order depends only on the map's contents, never on insertion order.
    #[must_use]
    pub fn sorted_rows(&self) -> Vec<&[String]> {
        let mut entries: Vec<(&RowKey, &Vec<String>)> = self.rows.iter().collect();
        entries.sort_by(|(ka, a), (kb, b)| {
            sort_instant(a)
                .cmp(&sort_instant(b))
                .then_with(|| authored_at(a).cmp(authored_at(b)))
                .then_with(|| ka.cmp(kb))
        });
        entries.into_iter().map(|(_, row)| row.as_slice()).collect()
    }
}

fn authored_at(row: &[String]) -> &str {
    row.get(AUTHORED_AT_COL).map_or("", String::as_str)
}

fn sort_instant(row: &[String]) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(authored_at(row))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Merge the two sides of a conflicted export file.
///
/// Rows only on one side are kept; on a key collision `theirs` (the incoming
/// remote side) wins.
#[must_use]
pub fn merge_csv_versions(ours: &str, theirs: &str) -> RowMap {
    let mut merged = RowMap::parse(ours);
    merged.extend(RowMap::parse(theirs));
    merged
}

/// Serialize rows under the canonical header.
///
/// # Errors
///
/// Returns an error if CSV serialization fails.
pub fn render(rows: &RowMap) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    for row in rows.sorted_rows() {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))
}
