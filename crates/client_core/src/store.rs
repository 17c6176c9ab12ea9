use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::{domain::RoomId, protocol::ChatMessage};
use uuid::Uuid;

/// How far apart an optimistic entry and its server echo may be timestamped
/// and still describe the same logical send.
pub(crate) const RECONCILE_WINDOW_SECS: i64 = 30;

/// One entry of a room log: either a local optimistic send awaiting its
/// server echo, or a server-persisted message with a stable id.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Pending { local_id: Uuid, message: ChatMessage },
    Confirmed(ChatMessage),
}

impl LogEntry {
    pub fn message(&self) -> &ChatMessage {
        match self {
            Self::Pending { message, .. } => message,
            Self::Confirmed(message) => message,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// Gapless, deduplicated log of one room, in arrival order.
///
/// Three sources feed it: the history snapshot after a join, live pushed
/// messages, and local optimistic sends. No re-sorting by timestamp happens
/// here; the server delivers history pre-sorted.
#[derive(Debug, Default)]
pub struct RoomLog {
    entries: Vec<LogEntry>,
}

impl RoomLog {
    /// Wholesale replacement with the server's snapshot. Clears any prior
    /// optimistic or stale entries; room activation is a hard reset of view
    /// state, not a merge.
    pub fn load_history(&mut self, messages: Vec<ChatMessage>) {
        self.entries = messages.into_iter().map(LogEntry::Confirmed).collect();
    }

    /// Appends an optimistic local send and returns its correlation id.
    pub fn append_pending(&mut self, message: ChatMessage) -> Uuid {
        let local_id = Uuid::new_v4();
        self.entries.push(LogEntry::Pending { local_id, message });
        local_id
    }

    /// Applies a live pushed message. Returns whether the log changed.
    ///
    /// A message whose persisted id is already confirmed is dropped (the
    /// server re-broadcasts and history may overlap with live pushes). A
    /// confirmed message matching a pending entry by sender and content
    /// within [`RECONCILE_WINDOW_SECS`] replaces that entry in place instead
    /// of duplicating the send.
    pub fn apply_incoming(&mut self, message: ChatMessage) -> bool {
        if let Some(id) = &message.id {
            let already_confirmed = self.entries.iter().any(|entry| {
                matches!(entry, LogEntry::Confirmed(existing) if existing.id.as_ref() == Some(id))
            });
            if already_confirmed {
                return false;
            }
            if let Some(index) = self.matching_pending(&message) {
                self.entries[index] = LogEntry::Confirmed(message);
                return true;
            }
        }
        self.entries.push(LogEntry::Confirmed(message));
        true
    }

    fn matching_pending(&self, confirmed: &ChatMessage) -> Option<usize> {
        self.entries.iter().position(|entry| match entry {
            LogEntry::Pending { message, .. } => {
                message.sender_id == confirmed.sender_id
                    && message.content == confirmed.content
                    && within_reconcile_window(message.created_at, confirmed.created_at)
            }
            LogEntry::Confirmed(_) => false,
        })
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.entries
            .iter()
            .map(|entry| entry.message().clone())
            .collect()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn within_reconcile_window(
    pending: Option<DateTime<Utc>>,
    confirmed: Option<DateTime<Utc>>,
) -> bool {
    match (pending, confirmed) {
        (Some(local), Some(server)) => {
            (server - local).num_seconds().abs() <= RECONCILE_WINDOW_SECS
        }
        // Without both timestamps the fallback key is sender + content alone.
        _ => true,
    }
}

/// Per-room logs, keyed by room id. Logs are retained across room switches;
/// re-activation reloads history over the cached view.
#[derive(Debug, Default)]
pub(crate) struct MessageStore {
    rooms: HashMap<RoomId, RoomLog>,
}

impl MessageStore {
    pub fn load_history(&mut self, room: &RoomId, messages: Vec<ChatMessage>) {
        self.rooms.entry(room.clone()).or_default().load_history(messages);
    }

    /// Routes the message into the log of its own room, so a misdelivered
    /// event can never leak into another room's log.
    pub fn apply_incoming(&mut self, message: ChatMessage) -> bool {
        self.rooms
            .entry(message.room_id.clone())
            .or_default()
            .apply_incoming(message)
    }

    pub fn append_pending(&mut self, message: ChatMessage) -> Uuid {
        self.rooms
            .entry(message.room_id.clone())
            .or_default()
            .append_pending(message)
    }

    pub fn messages(&self, room: &RoomId) -> Vec<ChatMessage> {
        self.rooms
            .get(room)
            .map(RoomLog::messages)
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
