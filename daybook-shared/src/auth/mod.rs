//! Authentication primitives
//!
//! # Modules
//!
//! - [`password`]: Argon2id password hashing and verification
//! - [`jwt`]: HS256 access token creation and validation
//! - [`middleware`]: bearer-token parsing and the per-request [`middleware::AuthContext`]
//!
//! # Example
//!
//! ```no_run
//! use daybook_shared::auth::jwt::{create_token, Claims};
//! use daybook_shared::auth::password::{hash_password, verify_password};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hash = hash_password("user_password")?;
//! assert!(verify_password("user_password", &hash)?);
//!
//! let token = create_token(&Claims::new("user_1"), "secret-key-of-at-least-32-bytes!")?;
//! # Ok(())
//! # }
//! ```

pub mod jwt;
pub mod middleware;
pub mod password;
