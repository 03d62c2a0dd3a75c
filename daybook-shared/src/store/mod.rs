//! Per-user JSON file store
//!
//! All persistent state lives in plain JSON files under a single data
//! directory. The store knows the layout and how to read and write a JSON
//! document; the models decide what goes into each file.
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//! ├── users.json                  # username -> {id, password_hash}
//! └── <user_id>/
//!     ├── profile.json            # {username, photoUrl}
//!     ├── <year>_events.json      # [event, ...]
//!     └── <year>_tasks.json       # {...}
//! ```
//!
//! Uploaded profile photos live in a separate uploads directory so they can
//! be served statically without exposing the JSON files:
//!
//! ```text
//! <uploads_dir>/<user_id>/<filename>
//! ```
//!
//! # Example
//!
//! ```no_run
//! use daybook_shared::store::FileStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileStore::open("data", "uploads").await?;
//! let users: serde_json::Value = store
//!     .read_json_or(&store.users_path(), serde_json::json!({}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Error type for file store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying filesystem error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File contents are not the JSON we expect
    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A path component is not a single safe segment
    #[error("Invalid path segment: {0:?}")]
    InvalidSegment(String),

    /// Username is already registered
    #[error("Username already exists: {0}")]
    UsernameTaken(String),

    /// Data on disk or in the request violates an invariant
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Store result type alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of per-year file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearFile {
    Events,
    Tasks,
}

impl YearFile {
    fn suffix(&self) -> &'static str {
        match self {
            YearFile::Events => "events",
            YearFile::Tasks => "tasks",
        }
    }
}

/// Handle to the on-disk store
///
/// Cheap to clone. The registration lock serialises updates to
/// `users.json`; every other file belongs to exactly one user.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
    uploads_dir: PathBuf,
    registration_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Opens the store, creating the data and uploads directories if needed
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        uploads_dir: impl Into<PathBuf>,
    ) -> StoreResult<Self> {
        let store = Self {
            data_dir: data_dir.into(),
            uploads_dir: uploads_dir.into(),
            registration_lock: Arc::new(Mutex::new(())),
        };

        create_dir_all(&store.data_dir).await?;
        create_dir_all(&store.uploads_dir).await?;

        info!(
            data_dir = %store.data_dir.display(),
            uploads_dir = %store.uploads_dir.display(),
            "Opened file store"
        );

        Ok(store)
    }

    /// Root of the JSON store
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Root of uploaded files
    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Lock guarding the shared user mapping
    pub(crate) fn registration_lock(&self) -> &Mutex<()> {
        &self.registration_lock
    }

    /// `<data_dir>/users.json`
    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    /// `<data_dir>/<user_id>`
    pub fn user_dir(&self, user_id: &str) -> StoreResult<PathBuf> {
        Ok(self.data_dir.join(safe_segment(user_id)?))
    }

    /// `<data_dir>/<user_id>/profile.json`
    pub fn profile_path(&self, user_id: &str) -> StoreResult<PathBuf> {
        Ok(self.user_dir(user_id)?.join("profile.json"))
    }

    /// `<data_dir>/<user_id>/<year>_<kind>.json`
    pub fn year_path(&self, user_id: &str, year: i32, kind: YearFile) -> StoreResult<PathBuf> {
        Ok(self
            .user_dir(user_id)?
            .join(format!("{}_{}.json", year, kind.suffix())))
    }

    /// `<uploads_dir>/<user_id>`
    pub fn user_uploads_dir(&self, user_id: &str) -> StoreResult<PathBuf> {
        Ok(self.uploads_dir.join(safe_segment(user_id)?))
    }

    /// Lists the years that have a file of the given kind, ascending
    ///
    /// A missing user directory yields an empty list.
    pub async fn list_years(&self, user_id: &str, kind: YearFile) -> StoreResult<Vec<i32>> {
        let dir = self.user_dir(user_id)?;
        let suffix = format!("_{}.json", kind.suffix());

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut years = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(year) = name
                .strip_suffix(suffix.as_str())
                .and_then(|y| y.parse::<i32>().ok())
            {
                years.push(year);
            }
        }

        years.sort_unstable();
        Ok(years)
    }

    /// Reads a JSON document, returning `default` when the file doesn't exist
    pub async fn read_json_or<T: DeserializeOwned>(&self, path: &Path, default: T) -> StoreResult<T> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(default),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes a JSON document atomically
    ///
    /// The document is written to a sibling temp file and renamed over the
    /// target, creating the parent directory when needed.
    pub async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_bytes(path, &bytes).await
    }

    /// Writes raw bytes atomically (temp file + rename)
    pub async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;

        if let Err(source) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
        Ok(())
    }

    /// Removes a file, treating "already gone" as success
    pub async fn remove_file(&self, path: &Path) -> StoreResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Checks the data directory exists and is a directory
    pub async fn is_writable(&self) -> bool {
        match tokio::fs::metadata(&self.data_dir).await {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => create_dir_all(&self.data_dir).await.is_ok(),
        }
    }
}

/// Validates that `segment` can be joined onto a directory as one component
///
/// Rejects empty strings, `.`/`..`, separators, NUL and leading dots.
pub fn safe_segment(segment: &str) -> StoreResult<&str> {
    let ok = !segment.is_empty()
        && segment.len() <= 255
        && !segment.starts_with('.')
        && !segment
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());

    if ok {
        Ok(segment)
    } else {
        Err(StoreError::InvalidSegment(segment.to_string()))
    }
}

async fn create_dir_all(path: &Path) -> StoreResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}
