//! API route handlers.
//!
//! JSON everywhere except `/metrics`, which serves the text exposition.
//! State is shared via `Arc<ApiState>`.

use axum::{
    extract::{MatchedPath, Path, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::engine::settlement::EngineStatus;
use crate::engine::{ProposeRequest, SettlementEngine};
use crate::modes::ConfigStep;
use crate::types::{Bet, EngineError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ApiState {
    pub engine: Arc<SettlementEngine>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub engine: EngineStatus,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeResponse {
    pub key: &'static str,
    pub label: &'static str,
    pub steps: Vec<ConfigStep>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoidRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Engine errors mapped onto HTTP statuses.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::ModeNotFound { .. } | EngineError::BetNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EngineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.engine.metrics().render(),
    )
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        engine: state.engine.status(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// GET /api/modes/:league
pub async fn get_modes(
    State(state): State<AppState>,
    Path(league): Path<String>,
) -> Result<Json<Vec<ModeResponse>>, ApiError> {
    let modes = state.engine.registry().modes(&league);
    if modes.is_empty() {
        return Err(EngineError::ModeNotFound {
            league,
            mode: "*".to_string(),
        }
        .into());
    }
    Ok(Json(
        modes
            .iter()
            .map(|m| ModeResponse {
                key: m.key(),
                label: m.label(),
                steps: m.config_steps(),
            })
            .collect(),
    ))
}

/// POST /api/bets
pub async fn propose_bet(
    State(state): State<AppState>,
    Json(req): Json<ProposeRequest>,
) -> Result<(StatusCode, Json<Bet>), ApiError> {
    let bet = state.engine.propose_bet(req).await?;
    Ok((StatusCode::CREATED, Json(bet)))
}

/// GET /api/bets/:id
pub async fn get_bet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Bet>, ApiError> {
    Ok(Json(state.engine.get_bet(id).await?))
}

/// POST /api/bets/:id/void
pub async fn void_bet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<VoidRequest>>,
) -> Result<Json<Bet>, ApiError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "cancelled".to_string());
    Ok(Json(state.engine.void_bet(id, &reason).await?))
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Count and time every routed request by its route template.
pub async fn track_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    state.engine.metrics().record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}
