//! In-memory chat history.
//!
//! Lines are kept for the life of the process with no cap. Replay hands out
//! a snapshot, so appends racing with a replay never disturb it.

use std::sync::{Arc, PoisonError, RwLock};

/// Append-only log of formatted chat lines (`"<name>:<message>"`).
#[derive(Debug, Default)]
pub struct HistoryBuffer {
    lines: RwLock<Vec<Arc<str>>>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line to the end of the log.
    pub fn append(&self, line: impl Into<Arc<str>>) {
        self.lines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.into());
    }

    /// Iterate every stored line in arrival order.
    ///
    /// The iterator walks a snapshot taken at call time; lines appended while
    /// it is being consumed are not included.
    pub fn replay(&self) -> std::vec::IntoIter<Arc<str>> {
        self.lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .into_iter()
    }

    /// Number of stored lines.
    pub fn len(&self) -> usize {
        self.lines.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
