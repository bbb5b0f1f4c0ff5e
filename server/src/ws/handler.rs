use axum::{
    extract::{RawQuery, State, WebSocketUpgrade},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// GET /websocket?nickname=NAME
/// WebSocket upgrade endpoint. The raw query string is passed through
/// untouched; the chat session decodes the nickname itself once open.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::debug!(query = ?query, "WebSocket upgrade requested");

    ws.on_failed_upgrade(|e| {
        tracing::warn!(error = %e, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| actor::run_connection(socket, state, query))
}
