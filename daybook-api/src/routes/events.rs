/// Event endpoints
///
/// - `GET /api/events/all` - Every stored event, year files in ascending order
/// - `POST /api/events/save_all` - Replace the full event list
/// - `GET /api/events/range?start=YYYY-MM-DD&end=YYYY-MM-DD` - Concrete
///   instances in a date range, recurring events expanded

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use chrono::NaiveDate;
use daybook_shared::{
    auth::middleware::AuthContext,
    models::event::{parse_date, Event},
    recurrence::expand_range,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bulk save response
#[derive(Debug, Serialize)]
pub struct SaveAllResponse {
    pub msg: String,

    /// Entries written
    pub saved: usize,

    /// Malformed entries that were dropped
    pub skipped: usize,
}

/// Range query; dates are `YYYY-MM-DD`
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Returns all of the caller's events as one flat array
pub async fn get_all_events(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<Event>>> {
    let events = Event::list_all(&state.store, &auth.user_id).await?;
    Ok(Json(events))
}

/// Replaces the caller's events with the posted list
///
/// # Request
///
/// ```json
/// [{"id": "1", "title": "Dentist", "date": "2025-03-04", "startTime": "09:00"}, ...]
/// ```
///
/// # Response
///
/// ```json
/// { "msg": "Events saved successfully", "saved": 1, "skipped": 0 }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Body is not a JSON array
pub async fn save_all_events(
    State(state): State<AppState>,
    auth: AuthContext,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<SaveAllResponse>> {
    let Json(body) = body?;
    let Value::Array(entries) = body else {
        return Err(ApiError::BadRequest(
            "Expected a JSON array of events".to_string(),
        ));
    };

    let summary = Event::save_all_split(&state.store, &auth.user_id, entries).await?;

    tracing::info!(
        user_id = %auth.user_id,
        saved = summary.saved,
        skipped = summary.skipped,
        "Events saved"
    );

    Ok(Json(SaveAllResponse {
        msg: "Events saved successfully".to_string(),
        saved: summary.saved,
        skipped: summary.skipped,
    }))
}

/// Returns the event instances visible between `start` and `end` (inclusive)
///
/// # Errors
///
/// - `400 Bad Request`: Missing or malformed dates, `start` after `end`, or
///   a range longer than a year
pub async fn get_events_in_range(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<Event>>> {
    let start = query_date("start", query.start.as_deref())?;
    let end = query_date("end", query.end.as_deref())?;

    let events = Event::list_all(&state.store, &auth.user_id).await?;
    let instances = expand_range(&events, start, end)?;

    Ok(Json(instances))
}

fn query_date(name: &str, value: Option<&str>) -> ApiResult<NaiveDate> {
    let value = value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing query parameter: {}", name)))?;

    parse_date(value).ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid {} date {:?}, expected YYYY-MM-DD", name, value))
    })
}
