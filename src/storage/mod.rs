//! SQLite storage layer for footprint.
//!
//! This module provides the local event log using SQLite with:
//! - WAL mode for concurrent hook writers
//! - Idempotent upserts keyed by `(repo, commit, source)`
//! - IMMEDIATE transactions for batch status updates
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteStorage, StatusCounts};
