//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// footprint - record git activity and export it to a CSV repository
#[derive(Parser, Debug)]
#[command(name = "fp", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: <config dir>/footprint/store.db)
    #[arg(long, global = true, env = "FP_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record the current commit (called from git hooks)
    Record {
        /// What triggered the event (post-commit, post-rewrite, post-checkout,
        /// post-merge, pre-push, manual, backfill)
        #[arg(long, default_value = "post-commit")]
        source: String,

        /// Do not run an automatic export afterwards
        #[arg(long)]
        no_export: bool,
    },

    /// Export pending events to the export repository
    Export {
        /// Ignore the export interval
        #[arg(long, alias = "now")]
        force: bool,

        /// Show what is pending without writing
        #[arg(long)]
        dry_run: bool,

        /// Set the export repository remote before exporting
        #[arg(long)]
        remote: Option<String>,
    },

    /// List recorded events
    Activity {
        /// Filter by status (pending, exported, orphaned, skipped)
        #[arg(long)]
        status: Option<String>,

        /// Filter by source
        #[arg(long)]
        source: Option<String>,

        /// Filter by repository id
        #[arg(long)]
        repo: Option<String>,

        /// Maximum events to show
        #[arg(long, short = 'n', default_value = "50")]
        limit: u32,
    },

    /// Start recording a repository
    Track {
        /// Path inside the repository (default: current directory)
        path: Option<PathBuf>,
    },

    /// Stop recording a repository and drop its unexported events
    Untrack {
        /// Path inside the repository (default: current directory)
        path: Option<PathBuf>,
    },

    /// List tracked repositories
    Repos,

    /// Repository identity commands
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Print version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// Show whether a repository is tracked, and under which id
    Status {
        /// Path inside the repository (default: current directory)
        path: Option<PathBuf>,
    },

    /// Move tracking from the local path id to the origin remote id
    AdoptRemote {
        /// Path inside the repository (default: current directory)
        path: Option<PathBuf>,
    },
}
