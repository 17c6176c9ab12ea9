use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use shared::domain::RoomId;

/// Minimum gap between repeated "typing" signals for one room.
pub(crate) const TYPING_MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Rate limiter for the ephemeral typing signal.
///
/// A "stopped typing" signal always passes so a peer is never left with a
/// stuck indicator; "typing" passes at most once per
/// [`TYPING_MIN_INTERVAL`] per room.
#[derive(Debug, Default)]
pub(crate) struct TypingThrottle {
    last_sent: HashMap<RoomId, Instant>,
}

impl TypingThrottle {
    pub fn should_send(&mut self, room: &RoomId, is_typing: bool, now: Instant) -> bool {
        if !is_typing {
            self.last_sent.remove(room);
            return true;
        }
        match self.last_sent.get(room) {
            Some(last) if now.duration_since(*last) < TYPING_MIN_INTERVAL => false,
            _ => {
                self.last_sent.insert(room.clone(), now);
                true
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/presence_tests.rs"]
mod tests;
