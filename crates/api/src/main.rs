//! Tally API Server
//!
//! Gamification engine: ingests user-activity events, evaluates configurable
//! rules, and grants rewards (points, badges, trophies, levels). Exposes the
//! event, rule, user-state, leaderboard, and wallet APIs plus a dry-run
//! sandbox.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod config;
mod engine;
mod error;
mod routes;
mod shared;
mod state;
mod store;

#[cfg(test)]
mod tests;

use config::AppConfig;
use state::AppState;

#[tokio::main]
async fn main() {
    // Load environment variables from .env
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration; a bad configuration is exit code 1
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error.message = %err, "Configuration error");
            std::process::exit(1);
        }
    };
    tracing::info!("Configuration loaded");

    // Any runtime fatal is exit code 2
    if let Err(err) = run(config).await {
        tracing::error!(error.message = %err, "Runtime failure");
        std::process::exit(2);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(&config));

    // One token fans out to the processor, the retention sweep, and the
    // HTTP server's graceful shutdown.
    let shutdown = CancellationToken::new();
    state.processor.start(&shutdown).await;
    spawn_retention_sweep(state.clone(), shutdown.clone());

    let app = build_router(state.clone());
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Drain the in-flight event and leave the rest queued
    shutdown.cancel();
    state.processor.stop().await;

    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let app: Router<Arc<AppState>> = Router::new()
        // Health check
        .merge(routes::health::router())
        // Core API surfaces
        .nest("/api", routes::api::router());

    app.with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}

/// Periodically purge events past the retention horizon.
fn spawn_retention_sweep(state: Arc<AppState>, shutdown: CancellationToken) {
    let interval = Duration::from_secs(state.config.events.sweep_interval_seconds.max(1));
    let retention_days = state.config.events.retention_days;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days);
            match state.events.purge_older_than(cutoff).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Retention sweep removed old events"),
                Err(err) => tracing::error!(error.message = %err, "Retention sweep failed"),
            }
        }
    });
}
