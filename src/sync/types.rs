//! Types shared by the export pipeline.

use std::path::PathBuf;

use serde::Serialize;

use crate::model::Event;

/// How an export run was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Ignore the export interval.
    pub force: bool,
    /// Report what is pending without writing anything.
    pub dry_run: bool,
}

/// Why an export run stopped before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NothingPending,
    DryRun,
    IntervalNotElapsed,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NothingPending => "nothing pending",
            Self::DryRun => "dry run",
            Self::IntervalNotElapsed => "export interval not elapsed",
        }
    }
}

/// Outcome of one export run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// Events pending when the run started.
    pub pending: usize,
    /// Events marked exported by this run.
    pub exported: usize,
    /// Export files rewritten.
    pub files: Vec<PathBuf>,
    pub pushed: bool,
    /// The pull failed and the run continued without the remote.
    pub offline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<SkipReason>,
    /// Events a dry run would export.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub would_export: Vec<Event>,
}

impl ExportReport {
    pub(crate) fn skipped(pending: usize, reason: SkipReason) -> Self {
        Self {
            pending,
            skipped_reason: Some(reason),
            ..Self::default()
        }
    }

    pub(crate) fn dry_run(pending: Vec<Event>) -> Self {
        Self {
            pending: pending.len(),
            skipped_reason: Some(SkipReason::DryRun),
            would_export: pending,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped_reason.is_some()
    }
}

/// Result of writing events into export files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialized {
    /// Ids of events now present in an export file.
    pub exported_ids: Vec<i64>,
    /// Files rewritten, in sorted order.
    pub modified_files: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_shape() {
        let report = ExportReport::skipped(3, SkipReason::IntervalNotElapsed);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pending"], 3);
        assert_eq!(json["skipped_reason"], "interval_not_elapsed");

        let json = serde_json::to_value(ExportReport::default()).unwrap();
        assert!(json.get("skipped_reason").is_none());
    }
}
