//! Read API for the external HTTP surface.
//!
//! Thin JSON accessors over the store plus the manual-refresh trigger.
//! Read endpoints never 500 on missing data; they return empty arrays,
//! or 404 only when a single-resource lookup misses.

pub mod routes;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::{AppState, DashboardState};

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/news", get(routes::news))
        .route("/news/refresh", post(routes::refresh))
        .route("/news/:date", get(routes::news_by_date))
        .route("/market-terminal", get(routes::market_terminal))
        .route("/market-terminal/latest", get(routes::market_terminal_latest))
        .route("/market-terminal/sentiment", get(routes::sentiment_history))
        .route("/market-terminal/history", get(routes::gpr_history))
        .route("/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until the process exits.
pub async fn serve(state: Arc<DashboardState>, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard listening");
    axum::serve(listener, router(state))
        .await
        .context("Dashboard server failed")?;
    Ok(())
}
