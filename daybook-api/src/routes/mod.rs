/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration and login
/// - `profile`: Display name and profile photo
/// - `events`: Full event list, bulk save and range expansion
/// - `tasks`: Per-year task mappings
/// - `chat`: Model-backed image parsing and scheduling

pub mod auth;
pub mod chat;
pub mod events;
pub mod health;
pub mod profile;
pub mod tasks;

use crate::error::ApiError;

/// Fallback for unmatched routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Resource not found".to_string())
}
