/// Chat endpoints backed by the scheduling assistant
///
/// - `POST /api/chat/parse_image` - Suggest events found in an image
/// - `POST /api/chat/schedule_event` - One conversational scheduling turn
///
/// Model failures are not HTTP errors here: both endpoints answer 200 with
/// a body the chat UI can show. Suggestions are never persisted; the client
/// saves accepted events through `/api/events/save_all`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Local;
use daybook_shared::{
    auth::middleware::AuthContext,
    llm::{ChatTurn, ImageParseOutcome, ImagePayload, ScheduleOutcome},
};
use serde::Deserialize;

/// Image parse request
#[derive(Debug, Deserialize)]
pub struct ParseImageRequest {
    /// Data URL or bare base64
    #[serde(default)]
    pub image: String,

    /// Optional instruction, e.g. "only the evening sessions"
    #[serde(default)]
    pub prompt: String,
}

/// Scheduling request
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

/// Extracts suggested events from an image
///
/// # Response
///
/// ```json
/// { "suggested_events": [{"title": "...", "date": "2025-06-01", ...}] }
/// ```
///
/// On model failure: `{ "suggested_events": [], "error": "..." }`.
///
/// # Errors
///
/// - `400 Bad Request`: Missing, empty or undecodable image
pub async fn parse_image(
    State(state): State<AppState>,
    auth: AuthContext,
    body: Result<Json<ParseImageRequest>, JsonRejection>,
) -> ApiResult<Json<ImageParseOutcome>> {
    let Json(req) = body?;
    if req.image.trim().is_empty() {
        return Err(ApiError::BadRequest("No image provided".to_string()));
    }

    let image = ImagePayload::parse(&req.image)?;
    tracing::debug!(user_id = %auth.user_id, bytes = image.size(), mime = image.mime(), "Parsing image");

    let outcome = state.assistant.parse_image(&image, &req.prompt).await;
    Ok(Json(outcome))
}

/// Runs one scheduling turn over the chat history
///
/// # Response
///
/// ```json
/// { "status": "success", "newEvent": {"id": "…", "title": "…", ...} }
/// { "status": "question", "message": "What time?" }
/// { "status": "error", "message": "Sorry, I didn't quite catch that. Could you please rephrase?" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Empty history
pub async fn schedule_event(
    State(state): State<AppState>,
    auth: AuthContext,
    body: Result<Json<ScheduleRequest>, JsonRejection>,
) -> ApiResult<Json<ScheduleOutcome>> {
    let Json(req) = body?;
    if req.history.iter().all(|turn| turn.text.trim().is_empty()) {
        return Err(ApiError::BadRequest("Chat history is empty".to_string()));
    }

    let today = Local::now().date_naive();
    let outcome = state.assistant.schedule_event(&req.history, today).await;

    let status = match &outcome {
        ScheduleOutcome::Success { .. } => "success",
        ScheduleOutcome::Question { .. } => "question",
        ScheduleOutcome::Error { .. } => "error",
    };
    tracing::info!(user_id = %auth.user_id, turns = req.history.len(), status, "Scheduling turn");

    Ok(Json(outcome))
}
