//! # Daybook Shared Library
//!
//! Domain types, storage and integrations used by the Daybook API server.
//!
//! ## Module Organization
//!
//! - `store`: JSON file storage rooted at the data directory
//! - `models`: users, profiles, events and tasks on top of the store
//! - `auth`: password hashing, access tokens and request auth context
//! - `llm`: model client and the scheduling assistant
//! - `recurrence`: expansion of recurring events into instances

pub mod auth;
pub mod llm;
pub mod models;
pub mod recurrence;
pub mod store;

/// Current version of the Daybook shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
