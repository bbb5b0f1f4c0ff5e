//! Per-connection chat lifecycle.
//!
//! The transport drives a [`ChatSession`] through the [`ConnectionEvents`]
//! trait. Events for one connection arrive in order; events for different
//! connections arrive concurrently and only meet in the shared registry and
//! history held by [`AppState`].

use crate::chat::identity;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_all;
use crate::ws::{Connection, ConnectionId};

/// Message payload that asks for a private replay of the history.
pub const LOAD_HISTORY_TOKEN: &str = "loadHistoryMessage";

/// Lifecycle callbacks the transport invokes for each connection.
pub trait ConnectionEvents {
    /// The connection was accepted. `query` is the raw request query string.
    fn on_open(&mut self, query: Option<&str>);

    /// A text frame arrived from the client.
    fn on_message(&mut self, text: &str);

    /// The connection is gone. Safe to call more than once.
    fn on_close(&mut self);

    /// Something failed on this connection. Does not close it.
    fn on_error(&mut self, error: &(dyn std::error::Error + 'static));
}

/// Where a session is in its lifecycle. There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Open,
    Closed,
}

/// Chat state for one connection.
pub struct ChatSession {
    state: AppState,
    connection: Connection,
    nickname: Option<String>,
    phase: SessionState,
}

impl ChatSession {
    pub fn new(state: AppState, connection: Connection) -> Self {
        Self {
            state,
            connection,
            nickname: None,
            phase: SessionState::Pending,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn phase(&self) -> SessionState {
        self.phase
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// Name used in chat lines; empty when the client gave none.
    pub fn display_name(&self) -> &str {
        self.nickname().unwrap_or("")
    }

    /// Send every stored line back to this connection only.
    fn replay_history(&self) {
        let mut sent = 0usize;
        for line in self.state.history.replay() {
            if let Err(e) = self.connection.send_text(&line) {
                tracing::warn!(
                    connection_id = %self.id(),
                    error = %e,
                    "History replay aborted"
                );
                return;
            }
            sent += 1;
        }
        tracing::debug!(connection_id = %self.id(), lines = sent, "History replayed");
    }
}

impl ConnectionEvents for ChatSession {
    fn on_open(&mut self, query: Option<&str>) {
        if self.phase != SessionState::Pending {
            tracing::debug!(connection_id = %self.id(), phase = ?self.phase, "Ignoring repeated open");
            return;
        }

        match identity::resolve_nickname(query) {
            Ok(nickname) => self.nickname = nickname,
            Err(e) => self.on_error(&e),
        }

        self.state.connections.register(self.connection.clone());
        self.phase = SessionState::Open;

        tracing::info!(
            connection_id = %self.id(),
            nickname = self.display_name(),
            online = self.state.connections.count(),
            "{} joined the group chat",
            self.display_name()
        );
    }

    fn on_message(&mut self, text: &str) {
        if self.phase != SessionState::Open {
            tracing::debug!(connection_id = %self.id(), phase = ?self.phase, "Ignoring message outside open session");
            return;
        }

        if text == LOAD_HISTORY_TOKEN {
            self.replay_history();
            return;
        }

        let line = format!("{}:{}", self.display_name(), text);
        self.state.history.append(line.as_str());

        tracing::info!(
            connection_id = %self.id(),
            nickname = self.display_name(),
            message = %text,
            "Message from client"
        );

        broadcast_to_all(&self.state.connections, &line);
    }

    fn on_close(&mut self) {
        match self.phase {
            SessionState::Closed => return,
            SessionState::Pending => {
                self.phase = SessionState::Closed;
                return;
            }
            SessionState::Open => {}
        }

        self.state.connections.deregister(self.id());
        self.phase = SessionState::Closed;

        tracing::info!(
            connection_id = %self.id(),
            nickname = self.display_name(),
            online = self.state.connections.count(),
            "{} left the group chat",
            self.display_name()
        );
    }

    fn on_error(&mut self, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(
            connection_id = %self.id(),
            nickname = self.display_name(),
            error = %error,
            detail = ?error,
            "Connection error"
        );
    }
}
