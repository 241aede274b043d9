//! Automatic resolution of divergent export histories.
//!
//! Two machines that each initialized their own export repository share no
//! history. Merging them conflicts on every CSV both created; since the
//! files are keyed row sets, the conflict is resolved by taking the union,
//! with the incoming remote side winning on equal keys.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::sync::csv::merge_csv_versions;
use crate::sync::file::write_csv_sorted;

/// Merge `origin/HEAD` into the export repository, resolving CSV conflicts.
///
/// On any failure the merge is aborted before returning, so the repository
/// is left as it was.
///
/// # Errors
///
/// Returns `ManualResolution` for a conflict in a non-CSV file, or a git
/// error if the merge cannot be completed.
pub fn merge_unrelated(dir: &Path) -> Result<()> {
    let upstream = super::remote_head(dir)?;
    let args = ["merge", &upstream, "--allow-unrelated-histories", "--no-edit"];
    let out = super::output(dir, &args)?;

    if out.status.success() {
        info!("Merged unrelated histories");
        return Ok(());
    }

    if !super::combined(&out).contains("CONFLICT") {
        abort_merge(dir);
        return Err(super::failure(&args, &out));
    }

    info!("Resolving CSV conflicts automatically");
    let resolved = resolve_conflicts(dir)
        .and_then(|()| super::run(dir, &["commit", "--no-edit"]).map(drop));

    match resolved {
        Ok(()) => {
            info!("Consolidated local and remote histories");
            Ok(())
        }
        Err(e) => {
            abort_merge(dir);
            Err(e)
        }
    }
}

fn abort_merge(dir: &Path) {
    if let Err(e) = super::run(dir, &["merge", "--abort"]) {
        warn!(error = %e, "Could not abort merge");
    }
}

/// Resolve every conflicted file in the index.
fn resolve_conflicts(dir: &Path) -> Result<()> {
    let conflicted = super::run(dir, &["diff", "--name-only", "--diff-filter=U"])?;

    for file in conflicted.lines().map(str::trim).filter(|f| !f.is_empty()) {
        if !Path::new(file)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        {
            return Err(Error::ManualResolution {
                file: file.to_string(),
            });
        }

        resolve_csv(dir, file)?;
        super::run(dir, &["add", "--", file])?;
    }

    Ok(())
}

/// Rewrite one conflicted CSV from its two index stages.
fn resolve_csv(dir: &Path, file: &str) -> Result<()> {
    let ours = stage(dir, 2, file);
    let theirs = stage(dir, 3, file);

    if ours.is_none() && theirs.is_none() {
        return Err(Error::Git {
            command: "show".to_string(),
            message: format!("neither side of {file} is available"),
        });
    }
    if ours.is_none() {
        warn!(file, "Local side missing during conflict resolution");
    }
    if theirs.is_none() {
        warn!(file, "Remote side missing during conflict resolution");
    }

    let merged = merge_csv_versions(
        ours.as_deref().unwrap_or_default(),
        theirs.as_deref().unwrap_or_default(),
    );
    write_csv_sorted(&dir.join(file), &merged)
}

/// Content of `file` at index stage `n` (2 = ours, 3 = theirs).
fn stage(dir: &Path, n: u8, file: &str) -> Option<String> {
    let rev = format!(":{n}:{file}");
    let out = super::output(dir, &["show", &rev]).ok()?;
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).into_owned())
}
