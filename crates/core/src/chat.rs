//! The chat entry type and in-memory, bounded per-room chat log (§3, §4.6).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The upper bound on a room's chat history, per §3: "Bound = 250 entries,
/// FIFO eviction."
pub const CHAT_LOG_BOUND: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatEntry {
    /// Construct an entry, rejecting an empty message per §3's invariant.
    pub fn new(role: ChatRole, message: impl Into<String>) -> Result<Self, CoreError> {
        let message = message.into();
        if message.is_empty() {
            return Err(CoreError::InvalidSignal("chat message must be non-empty".into()));
        }
        Ok(Self {
            role,
            message,
            timestamp: Utc::now(),
        })
    }
}

/// Bounded, per-room append log. `addChatEntry`/`getChatHistory` of §4.6.
///
/// Lock discipline: the `RwLock` is held only for the duration of the
/// map/deque mutation, never across an `.await` (there is none in this
/// module — the log is plain synchronous bookkeeping).
#[derive(Default)]
pub struct ChatLog {
    rooms: RwLock<HashMap<String, VecDeque<ChatEntry>>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry`, then truncates the room's log to the last
    /// [`CHAT_LOG_BOUND`] entries (FIFO eviction).
    pub fn add_entry(&self, room_id: &str, entry: ChatEntry) {
        let mut rooms = self.rooms.write();
        let log = rooms.entry(room_id.to_string()).or_default();
        log.push_back(entry);
        while log.len() > CHAT_LOG_BOUND {
            log.pop_front();
        }
    }

    /// Returns a snapshot of the room's history; callers may not mutate the
    /// live log through this, by construction.
    pub fn history(&self, room_id: &str) -> Vec<ChatEntry> {
        self.rooms
            .read()
            .get(room_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_to_bound_fifo() {
        let log = ChatLog::new();
        for i in 0..260 {
            log.add_entry("room-1", ChatEntry::new(ChatRole::User, format!("msg-{i}")).unwrap());
        }
        let history = log.history("room-1");
        assert_eq!(history.len(), CHAT_LOG_BOUND);
        assert_eq!(history.first().unwrap().message, "msg-10");
        assert_eq!(history.last().unwrap().message, "msg-259");
    }

    #[test]
    fn empty_message_rejected() {
        assert!(ChatEntry::new(ChatRole::User, "").is_err());
    }

    #[test]
    fn unknown_room_is_empty() {
        let log = ChatLog::new();
        assert!(log.history("nope").is_empty());
    }
}
