//! Request Handlers

use super::{
    errors::{ApiError, ApiErrorKind},
    middleware::RequestId,
    models::*,
};
use crate::game::engine::CrashGame;
use crate::game::types::FinishedRound;
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub game: CrashGame,
    pub version: String,
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// GET /status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
        uptime_secs: state.game.metrics().uptime_secs(),
        round: state.game.snapshot().await,
    })
}

/// GET /rounds/recent?limit={n}
pub async fn recent_rounds_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentRoundsQuery>,
) -> Result<Json<RecentRoundsResponse>, ApiError> {
    let rounds = state
        .game
        .recent_rounds(query.effective_limit())
        .await
        .map_err(|e| ApiError::new(&request_id.0, e))?;

    Ok(Json(RecentRoundsResponse {
        count: rounds.len(),
        rounds,
    }))
}

/// GET /rounds/:round_id
pub async fn round_detail_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<String>,
) -> Result<Json<FinishedRound>, ApiError> {
    let id = Uuid::parse_str(&round_id)
        .map_err(|_| ApiError::new(&request_id.0, ApiErrorKind::InvalidRoundId(round_id.clone())))?;

    state
        .game
        .round(id)
        .await
        .map_err(|e| ApiError::new(&request_id.0, e))?
        .map(Json)
        .ok_or_else(|| ApiError::new(&request_id.0, ApiErrorKind::RoundNotFound(id)))
}
