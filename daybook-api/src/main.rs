//! # Daybook API Server
//!
//! HTTP backend for the Daybook calendar: accounts, per-user event and task
//! storage, profile photos, and model-backed event extraction.
//!
//! ## Usage
//!
//! ```bash
//! JWT_SECRET=... LLM_API_KEY=... cargo run -p daybook-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

use daybook_api::{
    app::{build_router, AppState},
    config::Config,
};
use daybook_shared::{llm::HttpLlmClient, store::FileStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "Daybook API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let store = FileStore::open(&config.storage.data_dir, &config.storage.uploads_dir).await?;

    let llm = HttpLlmClient::new(config.llm.client_config())?;
    tracing::info!(
        endpoint = llm.endpoint(),
        model = %config.llm.model,
        vision_model = %config.llm.vision_model,
        "LLM client ready"
    );

    let bind_address = config.bind_address();
    let state = AppState::new(store, config, Arc::new(llm));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "daybook_api=debug,daybook_shared=debug,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
