//! Export command implementation.

use std::path::PathBuf;

use colored::Colorize;

use crate::config::{ConfigFile, ExportSettings, EXPORT_REMOTE_KEY};
use crate::error::Result;
use crate::git::{GitMetadata, GitTransport, Transport};
use crate::sync::{ExportOptions, ExportReport, Exporter, FileStateStore, SkipReason};

/// Execute the export command.
///
/// # Errors
///
/// Returns an error if configuration cannot be read, the remote cannot be
/// set, or the export run fails.
pub fn execute(
    force: bool,
    dry_run: bool,
    remote: Option<&str>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let (config_path, config) = super::load_config()?;
    let settings = ExportSettings::from_config(&config)?;
    let transport = GitTransport::new();

    let remote = remote.map(str::to_string).or_else(|| {
        settings
            .remote
            .clone()
            .filter(|_| !transport.has_remote(&settings.export_dir))
    });
    if let Some(url) = remote.filter(|_| !dry_run) {
        transport.ensure_repo(&settings.export_dir)?;
        transport.set_remote(&settings.export_dir, &url)?;
        ConfigFile::update(&config_path, |cfg| {
            cfg.set(EXPORT_REMOTE_KEY, &url);
            Ok(())
        })?;
    }

    let mut storage = super::open_storage(db_path)?;
    let state = FileStateStore::new(config_path);
    let mut exporter = Exporter::new(
        &mut storage,
        &transport,
        &GitMetadata,
        &state,
        settings.export_dir.clone(),
        settings.interval,
    );
    let report = exporter.run(ExportOptions { force, dry_run })?;

    if json {
        let output = serde_json::json!({
            "export_dir": settings.export_dir.display().to_string(),
            "report": report,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_report(&report, &settings);
    }
    Ok(())
}

fn print_report(report: &ExportReport, settings: &ExportSettings) {
    if let Some(reason) = report.skipped_reason {
        println!("{} pending event(s); nothing exported ({}).", report.pending, reason.as_str());
        if reason == SkipReason::IntervalNotElapsed {
            println!("Use --force to export regardless of the interval.");
        }
        for event in &report.would_export {
            let short: String = event.commit.chars().take(8).collect();
            println!(
                "  {} {} {} {}",
                short.bold(),
                event.repo_id,
                format!("[{}]", event.branch).dimmed(),
                event.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            );
        }
        return;
    }

    println!("{}", "Export complete".green().bold());
    println!("  Events:   {}", report.exported);
    println!("  Files:    {}", report.files.len());
    for file in &report.files {
        println!("    {}", file.display().to_string().dimmed());
    }
    println!("  Location: {}", settings.export_dir.display());
    if report.offline {
        println!("  {}", "Remote unreachable, exported offline".yellow());
    }
    if report.pushed {
        println!("  Pushed to remote");
    } else if report.exported < report.pending {
        println!("  {}", "Not pushed; events stay pending until the next export".yellow());
    }
}
