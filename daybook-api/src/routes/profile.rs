/// Profile endpoints
///
/// - `GET /api/profile` - Current display name and photo URL
/// - `POST /api/profile` - Multipart update with optional `username` text
///   field and optional `photo` file
///
/// Photos are served back from `/uploads/<user_id>/<filename>`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use daybook_shared::{
    auth::middleware::AuthContext,
    models::{profile::Profile, user::User},
};

/// Login name of the caller, used when no profile file exists
async fn login_name(state: &AppState, user_id: &str) -> ApiResult<String> {
    Ok(User::find_by_id(&state.store, user_id)
        .await?
        .map(|user| user.username)
        .unwrap_or_default())
}

/// Returns the caller's profile
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Profile>> {
    let fallback = login_name(&state, &auth.user_id).await?;
    let profile = Profile::load(&state.store, &auth.user_id, &fallback).await?;
    Ok(Json(profile))
}

/// Updates display name and/or photo
///
/// A blank `username` leaves the name unchanged. An empty `photo` part (a
/// form submitted without choosing a file) is ignored. Photo files are only
/// discarded after the outcome is known: the replaced photo once the profile
/// is saved, the newly uploaded ones if the update fails.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed multipart body or unsupported photo type
/// - `413 Payload Too Large`: Body exceeds `MAX_UPLOAD_BYTES`
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Profile>> {
    let mut multipart = multipart?;
    let fallback = login_name(&state, &auth.user_id).await?;
    let mut profile = Profile::load(&state.store, &auth.user_id, &fallback).await?;
    let previous = profile.photo_filename(&auth.user_id);

    let mut uploaded = Vec::new();
    let applied = apply_fields(
        &state,
        &auth.user_id,
        &mut profile,
        &mut multipart,
        &mut uploaded,
    )
    .await;
    let outcome = match applied {
        Ok(()) => profile
            .save(&state.store, &auth.user_id)
            .await
            .map_err(ApiError::from),
        Err(err) => Err(err),
    };

    let stale: Vec<String> = match &outcome {
        Ok(()) => {
            let current = profile.photo_filename(&auth.user_id);
            previous
                .into_iter()
                .chain(uploaded)
                .filter(|name| Some(name) != current.as_ref())
                .collect()
        }
        Err(_) => uploaded,
    };
    for filename in stale {
        if let Err(err) = Profile::remove_photo(&state.store, &auth.user_id, &filename).await {
            tracing::warn!(
                user_id = %auth.user_id,
                filename = %filename,
                error = %err,
                "Failed to remove photo"
            );
        }
    }

    outcome?;
    tracing::info!(user_id = %auth.user_id, "Profile updated");

    Ok(Json(profile))
}

/// Applies the multipart fields to `profile`, recording stored photo files
async fn apply_fields(
    state: &AppState,
    user_id: &str,
    profile: &mut Profile,
    multipart: &mut Multipart,
    uploaded: &mut Vec<String>,
) -> ApiResult<()> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "username" => {
                let text = field.text().await?;
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    profile.username = trimmed.to_string();
                }
            }
            "photo" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                if filename.is_empty() && data.is_empty() {
                    continue;
                }
                let stored = profile
                    .replace_photo(&state.store, user_id, &filename, &data)
                    .await?;
                uploaded.push(stored);
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown profile field");
            }
        }
    }

    Ok(())
}
