//! Route Definitions

use super::{handlers::*, monitoring::metrics_handler, websocket::websocket_handler};
use axum::{routing::get, Router};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        // Round history
        .route("/rounds/recent", get(recent_rounds_handler))
        .route("/rounds/:round_id", get(round_detail_handler))
        // Game transport
        .route("/ws", get(websocket_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
