//! footprint - git activity recorder and CSV exporter
//!
//! This crate provides the core functionality for the `fp` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Event, EventStatus, EventSource, RepoId)
//! - [`storage`] - SQLite event store
//! - [`record`] - Event ingestion from git hooks
//! - [`tracking`] - Local vs remote repository identity
//! - [`git`] - Commit metadata, export repository transport, conflict resolution
//! - [`sync`] - CSV export pipeline
//! - [`config`] - Configuration management
//! - [`retry`] - Retry with exponential backoff
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod model;
pub mod record;
pub mod retry;
pub mod storage;
pub mod sync;
pub mod tracking;

pub use error::{Error, Result};
