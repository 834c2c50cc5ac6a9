//! HTTP API: health, metrics exposition and bet operations.
//!
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use routes::AppState;

/// Bind the listener and serve in a background task.
pub async fn spawn_server(state: AppState, bind: &str) -> Result<SocketAddr> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind API server on {bind}"))?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    info!(%addr, "API server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server error");
        }
    });

    Ok(addr)
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .route("/api/status", get(routes::get_status))
        .route("/api/modes/:league", get(routes::get_modes))
        .route("/api/bets", post(routes::propose_bet))
        .route("/api/bets/:id", get(routes::get_bet))
        .route("/api/bets/:id/void", post(routes::void_bet))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::track_metrics,
        ))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
