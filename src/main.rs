//! footprint CLI entry point.

use clap::Parser;
use fp::cli::commands;
use fp::cli::{Cli, Commands, RepoCommands};
use fp::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let json = cli.json;

    match &cli.command {
        Commands::Record { source, no_export } => commands::record::execute(source, *no_export, db),
        Commands::Export {
            force,
            dry_run,
            remote,
        } => commands::export::execute(*force, *dry_run, remote.as_deref(), db, json),
        Commands::Activity {
            status,
            source,
            repo,
            limit,
        } => commands::activity::execute(
            status.as_deref(),
            source.as_deref(),
            repo.as_deref(),
            *limit,
            db,
            json,
        ),
        Commands::Track { path } => commands::repo::track(path.as_deref(), json),
        Commands::Untrack { path } => commands::repo::untrack(path.as_deref(), db, json),
        Commands::Repos => commands::repo::list(json),
        Commands::Repo { command } => match command {
            RepoCommands::Status { path } => commands::repo::status(path.as_deref(), json),
            RepoCommands::AdoptRemote { path } => commands::repo::adopt_remote(path.as_deref(), json),
        },
        Commands::Version => commands::version::execute(db, json),
    }
}
