use std::sync::Arc;

use crate::chat::history::HistoryBuffer;
use crate::config::WsConfig;
use crate::ws::{new_connection_registry, ConnectionRegistry};

/// Shared application state passed to all handlers via axum State extractor.
///
/// Built once at startup; tests build their own so nothing leaks between cases.
#[derive(Clone)]
pub struct AppState {
    /// Live WebSocket connections and the online counter
    pub connections: Arc<ConnectionRegistry>,
    /// Every chat line broadcast since startup
    pub history: Arc<HistoryBuffer>,
    /// Ping/pong and write timing for connection actors
    pub ws: WsConfig,
}

impl AppState {
    pub fn new(ws: WsConfig) -> Self {
        Self {
            connections: new_connection_registry(),
            history: Arc::new(HistoryBuffer::new()),
            ws,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(WsConfig::default())
    }
}
