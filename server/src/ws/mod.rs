pub mod actor;
pub mod broadcast;
pub mod handler;

use axum::extract::ws::{CloseFrame, Message};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Type alias for the sender half of a WebSocket connection's channel.
/// The connection's writer task drains the other half into the socket.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Identity assigned to a connection when it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pushing a frame to a connection failed.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection {id} is closed")]
    Closed { id: ConnectionId },
}

/// Handle to one client's live channel.
///
/// Cloning is cheap; every clone pushes into the same writer task.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: ConnectionSender,
}

impl Connection {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame for this client. Never blocks.
    pub fn send(&self, message: Message) -> Result<(), SendError> {
        self.sender
            .send(message)
            .map_err(|_| SendError::Closed { id: self.id })
    }

    /// Queue a text frame for this client.
    pub fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.send(Message::Text(text.into()))
    }

    /// Queue a close frame; the writer stops after flushing it.
    pub fn close(&self, code: u16, reason: &str) -> Result<(), SendError> {
        self.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
    }
}

/// Connection registry: every live connection plus the online counter.
///
/// The counter is only touched while the shard holding the entry is locked,
/// so a removal can never be counted before its matching insertion.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    online: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns false (and changes nothing) if it is
    /// already registered.
    pub fn register(&self, connection: Connection) -> bool {
        match self.connections.entry(connection.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                self.online.fetch_add(1, Ordering::SeqCst);
                slot.insert(connection);
                true
            }
        }
    }

    /// Remove a connection. Returns false if it was not registered.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        match self.connections.entry(id) {
            Entry::Occupied(slot) => {
                slot.remove();
                self.online.fetch_sub(1, Ordering::SeqCst);
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Copy of the current membership, safe to iterate while others join
    /// or leave.
    pub fn snapshot(&self) -> Vec<Connection> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Current online count.
    pub fn count(&self) -> usize {
        self.online.load(Ordering::SeqCst)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }
}

/// Create a new empty connection registry.
pub fn new_connection_registry() -> Arc<ConnectionRegistry> {
    Arc::new(ConnectionRegistry::new())
}
