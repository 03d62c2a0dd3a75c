/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use daybook_api::{app::AppState, config::Config};
/// use daybook_shared::llm::HttpLlmClient;
/// use daybook_shared::store::FileStore;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let store = FileStore::open(&config.storage.data_dir, &config.storage.uploads_dir).await?;
/// let client = Arc::new(HttpLlmClient::new(config.llm.client_config())?);
/// let state = AppState::new(store, config, client);
/// let app = daybook_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{
        rate_limit::{rate_limit_layer, RateLimit, RateLimiter},
        security::SecurityHeadersLayer,
    },
};
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use daybook_shared::{
    auth::middleware::{bearer_token, AuthContext},
    llm::{Assistant, LlmClient},
    store::FileStore,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// JSON file store
    pub store: FileStore,

    /// Application configuration
    pub config: Arc<Config>,

    /// Model-backed scheduling assistant
    pub assistant: Assistant,

    /// Per-user chat budget
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Creates new application state
    pub fn new(store: FileStore, config: Config, llm: Arc<dyn LlmClient>) -> Self {
        let assistant = Assistant::new(llm, config.llm.model.clone(), config.llm.vision_model.clone());
        let rate_limiter =
            RateLimiter::new(RateLimit::per_minute(config.chat.rate_limit_per_minute));

        Self {
            store,
            config: Arc::new(config),
            assistant,
            rate_limiter,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET  /health                      # Health check (public)
/// ├── GET  /uploads/<user_id>/<file>    # Profile photos (public, static)
/// └── /api/
///     ├── POST /register                # public
///     ├── POST /login                   # public
///     ├── GET|POST /profile             # JWT
///     ├── GET  /events/all              # JWT
///     ├── POST /events/save_all         # JWT
///     ├── GET  /events/range            # JWT
///     ├── GET|POST /tasks/:year         # JWT
///     └── /chat/                        # JWT + rate limit
///         ├── POST /parse_image
///         └── POST /schedule_event
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Security headers
/// 4. Authentication and rate limiting (per-route basis)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let upload_limit = state.config.storage.max_upload_bytes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Auth routes (public, no auth required)
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login));

    // Data routes (require JWT authentication)
    let data_routes = Router::new()
        .route(
            "/profile",
            get(routes::profile::get_profile)
                .post(routes::profile::update_profile)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/events/all", get(routes::events::get_all_events))
        .route("/events/save_all", post(routes::events::save_all_events))
        .route("/events/range", get(routes::events::get_events_in_range))
        .route(
            "/tasks/:year",
            get(routes::tasks::get_tasks).post(routes::tasks::save_tasks),
        )
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    // Chat routes (JWT + rate limiting); images arrive base64-encoded,
    // a third larger than the raw upload
    let chat_routes = Router::new()
        .route("/parse_image", post(routes::chat::parse_image))
        .route("/schedule_event", post(routes::chat::schedule_event))
        .layer(DefaultBodyLimit::max(upload_limit / 3 * 4 + 4096))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_layer))
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let api_routes = Router::new()
        .merge(auth_routes)
        .merge(data_routes)
        .nest("/chat", chat_routes);

    // Configure CORS based on environment
    let cors = if state.config.cors_permissive() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .nest_service("/uploads", ServeDir::new(state.store.uploads_dir()))
        .fallback(routes::not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Extracts and validates JWT token from Authorization header,
/// then injects AuthContext into request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;
    let auth_context = AuthContext::from_token(token, state.jwt_secret())?;

    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}
