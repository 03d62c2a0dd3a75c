//! User accounts
//!
//! Users live in a single shared mapping, `users.json`, keyed by username:
//!
//! ```json
//! {
//!     "alice": { "id": "user_1", "password_hash": "$argon2id$..." }
//! }
//! ```
//!
//! Registration also seeds the user's data directory with a profile and
//! empty year files so the client has something to read straight away.
//!
//! # Example
//!
//! ```no_run
//! use daybook_shared::models::user::{CreateUser, User};
//! use daybook_shared::store::FileStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileStore::open("data", "uploads").await?;
//! let user = User::create(
//!     &store,
//!     CreateUser {
//!         username: "alice".to_string(),
//!         password_hash: "$argon2id$...".to_string(),
//!     },
//! )
//! .await?;
//! println!("Created user: {}", user.id);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::profile::Profile;
use crate::store::{FileStore, StoreError, StoreResult, YearFile};

/// Prefix of generated user ids
const USER_ID_PREFIX: &str = "user_";

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Stable user id, e.g. `user_3`; also the name of the data directory
    pub id: String,

    /// Login name (key of the user mapping)
    pub username: String,

    /// Argon2id password hash
    pub password_hash: String,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,

    /// Argon2id password hash (NOT the plaintext password!)
    pub password_hash: String,
}

/// Value stored under each username in `users.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    id: String,
    password_hash: String,
}

type UserMap = BTreeMap<String, UserRecord>;

impl User {
    /// Registers a new user and seeds their data directory
    ///
    /// # Errors
    ///
    /// - `StoreError::UsernameTaken` if the username is already registered
    /// - `StoreError::Io`/`StoreError::Json` on filesystem problems
    pub async fn create(store: &FileStore, data: CreateUser) -> StoreResult<Self> {
        let _guard = store.registration_lock().lock().await;

        let mut users = load_users(store).await?;
        if users.contains_key(&data.username) {
            return Err(StoreError::UsernameTaken(data.username));
        }

        let id = next_user_id(&users);

        // The account only becomes visible once its files exist
        seed_user_files(store, &id, &data.username).await?;

        users.insert(
            data.username.clone(),
            UserRecord {
                id: id.clone(),
                password_hash: data.password_hash.clone(),
            },
        );
        store.write_json(&store.users_path(), &users).await?;

        info!(user_id = %id, username = %data.username, "Registered user");

        Ok(Self {
            id,
            username: data.username,
            password_hash: data.password_hash,
        })
    }

    /// Finds a user by username
    pub async fn find_by_username(store: &FileStore, username: &str) -> StoreResult<Option<Self>> {
        let users = load_users(store).await?;
        Ok(users.get(username).map(|record| Self {
            id: record.id.clone(),
            username: username.to_string(),
            password_hash: record.password_hash.clone(),
        }))
    }

    /// Finds a user by id
    pub async fn find_by_id(store: &FileStore, id: &str) -> StoreResult<Option<Self>> {
        let users = load_users(store).await?;
        Ok(users
            .into_iter()
            .find(|(_, record)| record.id == id)
            .map(|(username, record)| Self {
                id: record.id,
                username,
                password_hash: record.password_hash,
            }))
    }
}

async fn load_users(store: &FileStore) -> StoreResult<UserMap> {
    store.read_json_or(&store.users_path(), UserMap::new()).await
}

/// Picks `user_<n>` with `n` one past the highest ordinal in use
fn next_user_id(users: &UserMap) -> String {
    let highest = users
        .values()
        .filter_map(|r| r.id.strip_prefix(USER_ID_PREFIX)?.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    let candidate = highest.max(users.len() as u64) + 1;
    format!("{}{}", USER_ID_PREFIX, candidate)
}

/// Seed years relative to today: last year, this year, next year
fn seed_years() -> [i32; 3] {
    let year = Utc::now().year();
    [year - 1, year, year + 1]
}

async fn seed_user_files(store: &FileStore, user_id: &str, username: &str) -> StoreResult<()> {
    Profile::new(username).save(store, user_id).await?;

    for year in seed_years() {
        let events = store.year_path(user_id, year, YearFile::Events)?;
        store.write_json(&events, &serde_json::json!([])).await?;

        let tasks = store.year_path(user_id, year, YearFile::Tasks)?;
        store.write_json(&tasks, &serde_json::json!({})).await?;
    }

    Ok(())
}
