//! # WebAuth Server
//!
//! Entry point: logging, configuration, database, the challenge cleanup
//! task, sessions, and the HTTP listener.

use time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webauth_server::config::Config;
use webauth_server::db::challenges;
use webauth_server::state::AppState;

/// How often unconsumed challenges are swept.
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,webauth_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    tracing::info!(rp_id = %app_state.rp.policy().rp_id(), "Application state initialized");

    // Challenges nobody came back for
    let cleanup_pool = app_state.db.clone();
    let timeout = app_state.rp.policy().timeout();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now()
                - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
            match challenges::purge_expired(&cleanup_pool, cutoff).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired challenges"),
                Err(e) => tracing::error!("Challenge cleanup failed: {:?}", e),
            }
        }
    });

    let session_store = SqliteStore::new(app_state.db.clone());
    session_store.migrate().await?;
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::hours(config.session_expiry_hours)));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = webauth_server::router(app_state)
        .fallback_service(ServeDir::new("static"))
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
