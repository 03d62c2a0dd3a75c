/// Task endpoints
///
/// Tasks are an opaque JSON object per user and year; the server only
/// checks that the posted value is an object.
///
/// - `GET /api/tasks/:year` - The stored mapping, `{}` when none
/// - `POST /api/tasks/:year` - Replace the mapping

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use daybook_shared::{auth::middleware::AuthContext, models::task::TaskList};
use serde::Serialize;
use serde_json::Value;

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
}

/// Parses the `:year` segment; four-digit years only
fn parse_year(raw: &str) -> ApiResult<i32> {
    raw.parse::<i32>()
        .ok()
        .filter(|year| (1000..=9999).contains(year))
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid year: {:?}", raw)))
}

pub async fn get_tasks(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(year): Path<String>,
) -> ApiResult<Json<Value>> {
    let year = parse_year(&year)?;
    let tasks = TaskList::load(&state.store, &auth.user_id, year).await?;
    Ok(Json(tasks.into_value()))
}

/// # Errors
///
/// - `400 Bad Request`: Invalid year, or the body is not a JSON object
pub async fn save_tasks(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(year): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let year = parse_year(&year)?;
    let Json(body) = body?;

    let tasks = TaskList::from_value(body)?;
    tasks.save(&state.store, &auth.user_id, year).await?;

    tracing::debug!(user_id = %auth.user_id, year, entries = tasks.0.len(), "Tasks saved");

    Ok(Json(MessageResponse {
        msg: "Tasks saved successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("2025").unwrap(), 2025);
        assert!(parse_year("25").is_err());
        assert!(parse_year("twenty").is_err());
        assert!(parse_year("-2025").is_err());
    }
}
