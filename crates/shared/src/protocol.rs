use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MessageId, NotificationId, NotificationKind, RoomId, UserId};

/// One chat message. `id` is absent until the server has persisted the
/// message; a message without an id is a transient optimistic entry that the
/// client reconciles against the server echo.
///
/// Field names follow the gateway's JSON (camelCase, Mongo-style `_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A cross-room event pushed by the gateway independent of the open room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    /// Present for `MESSAGE` notifications; routes the read-ack when the
    /// matching room is opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Frames the client emits to the messaging gateway.
///
/// Serialized as `{"event": "<name>", "data": <payload>}` with snake_case
/// event names; the names are a fixed contract with the server. All frames
/// are fire-and-forget, no ack is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: RoomId, user_id: UserId },
    /// Best-effort leave intent; the server is the authority on cleanup.
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId, user_id: UserId },
    /// Triggers a `chat_history` response for the room.
    #[serde(rename_all = "camelCase")]
    LoadMessages { room_id: RoomId },
    SendMessage(ChatMessage),
    /// Ephemeral typing signal, never persisted.
    #[serde(rename_all = "camelCase")]
    Typing {
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    },
}

/// Frames the gateway pushes to the client. History and live messages are
/// room-scoped; notifications arrive regardless of the open room. Streams
/// are ordered individually but interleave arbitrarily with each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Ordered backlog for the most recently joined room, pre-sorted by the
    /// server. May be redelivered after a reconnect.
    ChatHistory(Vec<ChatMessage>),
    /// Single live message, pushed to every member of its room, the sender
    /// included.
    ReceiveMessage(ChatMessage),
    Notification(Notification),
    #[serde(rename_all = "camelCase")]
    Typing {
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    },
}
