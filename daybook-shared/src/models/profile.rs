//! User profile and profile photo storage

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{safe_segment, FileStore, StoreError, StoreResult};

/// File extensions accepted for profile photos
pub const ALLOWED_PHOTO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Public profile shown by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name
    pub username: String,

    /// URL path of the profile photo, empty when none was uploaded
    #[serde(rename = "photoUrl", default)]
    pub photo_url: String,
}

impl Profile {
    /// Creates a profile with no photo
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            photo_url: String::new(),
        }
    }

    /// Loads a user's profile, falling back to `{username: fallback_username, photoUrl: ""}`
    pub async fn load(store: &FileStore, user_id: &str, fallback_username: &str) -> StoreResult<Self> {
        let path = store.profile_path(user_id)?;
        store.read_json_or(&path, Self::new(fallback_username)).await
    }

    /// Saves the profile to `profile.json`
    pub async fn save(&self, store: &FileStore, user_id: &str) -> StoreResult<()> {
        let path = store.profile_path(user_id)?;
        store.write_json(&path, self).await
    }

    /// Stores a new profile photo and points `photo_url` at it
    ///
    /// The photo is written as `profile_<uuid>.<ext>` under the user's
    /// uploads directory and the new filename is returned. The previous
    /// photo stays on disk; callers remove it with [`Profile::remove_photo`]
    /// once the updated profile has been saved.
    ///
    /// # Errors
    ///
    /// `StoreError::InvalidData` if the original filename's extension is not
    /// an accepted image type.
    pub async fn replace_photo(
        &mut self,
        store: &FileStore,
        user_id: &str,
        original_filename: &str,
        data: &[u8],
    ) -> StoreResult<String> {
        let ext = photo_extension(original_filename).ok_or_else(|| {
            StoreError::InvalidData(format!(
                "Unsupported photo type; expected one of: {}",
                ALLOWED_PHOTO_EXTENSIONS.join(", ")
            ))
        })?;

        let filename = format!("profile_{}.{}", uuid::Uuid::new_v4().simple(), ext);
        let dir = store.user_uploads_dir(user_id)?;
        store.write_bytes(&dir.join(&filename), data).await?;

        self.photo_url = photo_url(user_id, &filename);
        info!(user_id, filename = %filename, bytes = data.len(), "Stored profile photo");
        Ok(filename)
    }

    /// Deletes an uploaded photo of this user
    pub async fn remove_photo(store: &FileStore, user_id: &str, filename: &str) -> StoreResult<()> {
        let dir = store.user_uploads_dir(user_id)?;
        store.remove_file(&dir.join(safe_segment(filename)?)).await
    }

    /// Filename of the current photo if it lives in this user's uploads dir
    pub fn photo_filename(&self, user_id: &str) -> Option<String> {
        let prefix = photo_url(user_id, "");
        self.photo_url
            .strip_prefix(prefix.as_str())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

/// Public URL path of an uploaded file
pub fn photo_url(user_id: &str, filename: &str) -> String {
    format!("/uploads/{}/{}", user_id, filename)
}

/// Lower-cased extension of `filename` if it is an accepted image type
pub fn photo_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_PHOTO_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}
