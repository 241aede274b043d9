//! Activity command implementation.

use std::path::PathBuf;

use colored::Colorize;

use crate::error::Result;
use crate::model::{Event, EventFilter, EventSource, EventStatus, RepoId};

/// Execute the activity command.
///
/// # Errors
///
/// Returns an error if a filter value is invalid or the query fails.
pub fn execute(
    status: Option<&str>,
    source: Option<&str>,
    repo: Option<&str>,
    limit: u32,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let filter = EventFilter {
        repo_id: repo.map(RepoId::new),
        status: status.map(str::parse::<EventStatus>).transpose()?,
        source: source.map(str::parse::<EventSource>).transpose()?,
        limit: Some(limit),
        ..EventFilter::default()
    };

    let storage = super::open_storage(db_path)?;
    let events = storage.list_events(&filter)?;

    if json {
        let counts = storage.count_by_status()?;
        let output = serde_json::json!({
            "events": events,
            "count": events.len(),
            "totals": counts,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }

    for event in &events {
        print_event(event);
    }
    Ok(())
}

fn print_event(event: &Event) {
    let status = match event.status {
        EventStatus::Pending => event.status.as_str().yellow(),
        EventStatus::Exported => event.status.as_str().green(),
        EventStatus::Orphaned | EventStatus::Skipped => event.status.as_str().dimmed(),
    };
    let short: String = event.commit.chars().take(8).collect();
    println!(
        "{} {} {} {} {} {}",
        event.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        status,
        short.bold(),
        event.repo_id,
        format!("[{}]", event.branch).dimmed(),
        event.source.to_string().dimmed(),
    );
}
