use std::collections::VecDeque;

use shared::domain::{RoomId, UserId};

use crate::error::ClientError;

/// Outcome of an activation request.
#[derive(Debug, PartialEq)]
pub(crate) enum Activation {
    /// The room was already active; nothing to emit.
    Unchanged,
    /// The active room changed; `left` is the room to send a leave intent
    /// for, if one was active before.
    Switched { left: Option<RoomId> },
}

/// Tracks which room the surrounding UI currently displays and the queue of
/// rooms with an outstanding history request.
///
/// Pure state machine; the owning client drives the wire traffic. History
/// responses arrive in request order on the single socket, so the oldest
/// outstanding request identifies an arriving snapshot even when the
/// snapshot is an empty backlog and carries no room id of its own. That is
/// what keeps a late-arriving snapshot for an abandoned room from
/// overwriting the now-active room's log.
#[derive(Debug, Default)]
pub(crate) struct RoomTracker {
    active: Option<RoomId>,
    peer: Option<UserId>,
    pending_history: VecDeque<RoomId>,
}

impl RoomTracker {
    /// Activating the already-active room is a no-op.
    pub fn activate(&mut self, room: RoomId, peer: Option<UserId>) -> Activation {
        if self.active.as_ref() == Some(&room) {
            return Activation::Unchanged;
        }
        let left = self.active.replace(room.clone());
        self.peer = peer;
        self.pending_history.push_back(room);
        Activation::Switched { left }
    }

    pub fn active(&self) -> Option<&RoomId> {
        self.active.as_ref()
    }

    pub fn peer(&self) -> Option<&UserId> {
        self.peer.as_ref()
    }

    /// Room to re-join after a reconnect. Server-side membership does not
    /// survive a transport reset, and the history that follows the re-join
    /// is expected again. Requests outstanding on the old connection died
    /// with it, so the queue restarts from the re-join alone.
    pub fn rejoin_target(&mut self) -> Option<RoomId> {
        self.pending_history.clear();
        let room = self.active.clone()?;
        self.pending_history.push_back(room.clone());
        Some(room)
    }

    /// Resolves an arriving history snapshot against the oldest outstanding
    /// request. `payload_room` is the room id carried by the snapshot's
    /// messages (absent for an empty backlog). A snapshot answering a
    /// request for a room that has since been switched away from is
    /// rejected as stale.
    pub fn accept_history(&mut self, payload_room: Option<&RoomId>) -> Result<RoomId, ClientError> {
        let Some(answered) = self.pending_history.pop_front() else {
            return Err(ClientError::StaleResponse {
                room_id: payload_room.map(|r| r.0.clone()).unwrap_or_default(),
                context: "history",
            });
        };
        if let Some(room) = payload_room {
            if *room != answered {
                return Err(ClientError::StaleResponse {
                    room_id: room.0.clone(),
                    context: "history",
                });
            }
        }
        if self.active.as_ref() != Some(&answered) {
            return Err(ClientError::StaleResponse {
                room_id: answered.0.clone(),
                context: "history",
            });
        }
        Ok(answered)
    }
}

#[cfg(test)]
#[path = "tests/rooms_tests.rs"]
mod tests;
