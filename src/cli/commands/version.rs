//! Version command implementation.
//!
//! Besides the crate version this reports the event store schema and the
//! paths a bug report needs. Paths that cannot be resolved print as `-`.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{config_file_path, resolve_db_path, ConfigFile, ExportSettings};
use crate::error::Result;
use crate::storage::schema::CURRENT_SCHEMA_VERSION;
use crate::sync::machine_name;

#[derive(Serialize)]
struct VersionOutput {
    version: &'static str,
    schema_version: i32,
    machine: String,
    config: Option<PathBuf>,
    database: Option<PathBuf>,
    export_dir: Option<PathBuf>,
}

/// Export directory from the config file, if it can be read.
fn export_dir(config: Option<&Path>) -> Option<PathBuf> {
    let config = ConfigFile::load(config?).ok()?;
    ExportSettings::from_config(&config)
        .ok()
        .map(|settings| settings.export_dir)
}

fn display(path: Option<&PathBuf>) -> String {
    path.map_or_else(|| "-".to_string(), |p| p.display().to_string())
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = config_file_path();
    let output = VersionOutput {
        version: env!("CARGO_PKG_VERSION"),
        schema_version: CURRENT_SCHEMA_VERSION,
        machine: machine_name(),
        export_dir: export_dir(config.as_deref()),
        database: resolve_db_path(db_path.map(PathBuf::as_path)),
        config,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "fp version {} (schema v{})",
        output.version, output.schema_version
    );
    println!("  machine:  {}", output.machine);
    println!("  config:   {}", display(output.config.as_ref()));
    println!("  database: {}", display(output.database.as_ref()));
    println!("  export:   {}", display(output.export_dir.as_ref()));
    Ok(())
}
