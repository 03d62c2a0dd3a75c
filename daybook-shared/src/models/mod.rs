//! Persisted entities and their file operations
//!
//! # Models
//!
//! - `user`: accounts in the shared `users.json` mapping
//! - `profile`: display name and profile photo
//! - `event`: calendar events, split into per-year files
//! - `task`: opaque per-year task mappings
//!
//! # Example
//!
//! ```no_run
//! use daybook_shared::models::event::Event;
//! use daybook_shared::store::FileStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileStore::open("data", "uploads").await?;
//! let events = Event::list_all(&store, "user_1").await?;
//! println!("{} events", events.len());
//! # Ok(())
//! # }
//! ```

pub mod event;
pub mod profile;
pub mod task;
pub mod user;
