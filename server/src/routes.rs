use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Body of `GET /api/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub online: usize,
    pub history: usize,
    pub version: &'static str,
}

/// GET /api/health — liveness plus the current online count and history size.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        online: state.connections.count(),
        history: state.history.len(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the full axum Router. `ws_path` must start with `/`.
pub fn build_router(state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler::ws_upgrade))
        .route("/api/health", get(health))
        .with_state(state)
}
