//! Data models for footprint.
//!
//! This module contains the domain models:
//! - Event (with its status and source enums)
//! - RepoId

pub mod event;
pub mod repo;

pub use event::{Event, EventFilter, EventSource, EventStatus, NewEvent};
pub use repo::RepoId;
