/// Authentication endpoints
///
/// This module provides user authentication endpoints:
/// - Registration
/// - Login
///
/// # Endpoints
///
/// - `POST /api/register` - Register new user
/// - `POST /api/login` - Login and get an access token

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use chrono::Duration;
use daybook_shared::{
    auth::{jwt, password},
    models::user::{CreateUser, User},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

const CREDENTIALS_REQUIRED: &str = "Username and password required";
const BAD_CREDENTIALS: &str = "Bad username or password";

/// Credentials for both register and login
#[derive(Debug, Deserialize, Validate)]
pub struct CredentialsRequest {
    /// Login name
    #[validate(
        required(message = "Username and password required"),
        length(max = 64, message = "Username must be at most 64 characters")
    )]
    pub username: Option<String>,

    #[validate(
        required(message = "Username and password required"),
        length(min = 1, message = "Username and password required")
    )]
    pub password: Option<String>,
}

impl CredentialsRequest {
    /// Validates and returns `(username, password)`; the username is trimmed
    /// and a blank one counts as missing
    fn into_parts(mut self) -> ApiResult<(String, String)> {
        self.username = self
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        self.validate()?;

        match (self.username, self.password) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(ApiError::BadRequest(CREDENTIALS_REQUIRED.to_string())),
        }
    }
}

/// Register response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub msg: String,

    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Access token
    pub access_token: String,

    #[serde(rename = "userId")]
    pub user_id: String,

    pub username: String,
}

/// Register a new user
///
/// Creates the account and seeds its data directory (profile plus empty
/// event/task files for last, this and next year).
///
/// # Endpoint
///
/// ```text
/// POST /api/register
/// Content-Type: application/json
///
/// { "username": "ann", "password": "hunter2" }
/// ```
///
/// # Response
///
/// ```json
/// { "msg": "User created successfully", "userId": "user_1" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing username or password
/// - `409 Conflict`: Username already exists
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let Json(req) = body?;
    let (username, password) = req.into_parts()?;

    let password_hash = password::hash_password(&password)?;

    let user = User::create(
        &state.store,
        CreateUser {
            username,
            password_hash,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            msg: "User created successfully".to_string(),
            user_id: user.id,
        }),
    ))
}

/// Login endpoint
///
/// # Endpoint
///
/// ```text
/// POST /api/login
/// Content-Type: application/json
///
/// { "username": "ann", "password": "hunter2" }
/// ```
///
/// # Response
///
/// ```json
/// { "access_token": "eyJ...", "userId": "user_1", "username": "ann" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing username or password
/// - `401 Unauthorized`: Unknown user or wrong password
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(req) = body?;
    let (username, password) = req.into_parts()?;

    let user = User::find_by_username(&state.store, &username)
        .await?
        .ok_or_else(|| {
            tracing::debug!(%username, "Login for unknown user");
            ApiError::Unauthorized(BAD_CREDENTIALS.to_string())
        })?;

    if !password::verify_password(&password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login with wrong password");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    let claims = jwt::Claims::with_expiration(
        user.id.clone(),
        Duration::hours(state.config.jwt.expiry_hours),
    );
    let access_token = jwt::create_token(&claims, state.jwt_secret())?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        user_id: user.id,
        username: user.username,
    }))
}
