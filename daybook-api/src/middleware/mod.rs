/// Middleware modules for the API server
///
/// This module contains custom middleware for:
/// - Security headers
/// - Per-user rate limiting of the chat endpoints

pub mod rate_limit;
pub mod security;
