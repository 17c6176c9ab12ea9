use thiserror::Error;

/// Failure taxonomy of the messaging core.
///
/// Nothing here is allowed to crash the process: `Connection` ends the
/// session and is surfaced to the caller, `Transport` is retried behind the
/// reconnect supervisor, `StaleResponse` is discarded, and
/// `PersistenceSync` keeps the optimistic local state.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The gateway rejected the connection handshake (invalid or expired
    /// token). Fatal for the session; never retried with the same token.
    #[error("gateway rejected the connection handshake: {reason}")]
    Connection { reason: String },

    /// An outbound frame was attempted while the transport is down. Sends
    /// fail fast instead of buffering; queuing a resend is the caller's
    /// decision.
    #[error("transport is not connected")]
    NotConnected,

    /// Transient network fault on the established transport.
    #[error("transport failure: {reason}")]
    Transport { reason: String },

    /// An async response arrived after its context became invalid, e.g.
    /// history for a room that is no longer active.
    #[error("stale {context} response for room {room_id}")]
    StaleResponse {
        room_id: String,
        context: &'static str,
    },

    /// A read-ack call to the notification persistence service failed. The
    /// local optimistic state is kept; there is no rollback.
    #[error("read-state sync failed: {reason}")]
    PersistenceSync { reason: String },

    /// An operation that needs an active room was called without one.
    #[error("no active room")]
    NoActiveRoom,
}

impl ClientError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::PersistenceSync {
            reason: reason.into(),
        }
    }

    /// True when the session itself is no longer usable and reconnecting
    /// with the same credentials cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::PersistenceSync {
            reason: err.to_string(),
        }
    }
}
