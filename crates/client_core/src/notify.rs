use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{NotificationId, NotificationKind, RoomId, UserId},
    error::ApiError,
    protocol::Notification,
};

use crate::error::ClientError;

/// Persistence of notification read-state, independent of the gateway.
///
/// The in-memory set is authoritative for the UI; every call here is
/// best-effort and a failure never rolls local state back.
#[async_trait]
pub trait ReadStateStore: Send + Sync {
    async fn fetch_unread(&self) -> Result<Vec<Notification>, ClientError>;
    async fn ack_read(&self, id: &NotificationId) -> Result<(), ClientError>;
    async fn ack_read_all(&self) -> Result<(), ClientError>;
}

/// HTTP implementation against the persistence service, bearer token on
/// every call.
pub struct HttpReadStateStore {
    http: Client,
    base_url: String,
    auth_token: String,
}

impl HttpReadStateStore {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
            auth_token: auth_token.into(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let reason = match response.json::<ApiError>().await {
            Ok(body) => body.to_string(),
            Err(_) => format!("status {status}"),
        };
        Err(ClientError::persistence(reason))
    }
}

#[async_trait]
impl ReadStateStore for HttpReadStateStore {
    async fn fetch_unread(&self) -> Result<Vec<Notification>, ClientError> {
        let response = self
            .http
            .get(format!("{}/notifications/unread", self.base_url))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn ack_read(&self, id: &NotificationId) -> Result<(), ClientError> {
        let response = self
            .http
            .patch(format!("{}/notifications/read/{id}", self.base_url))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn ack_read_all(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .patch(format!("{}/notifications/read-all", self.base_url))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// The session-wide notification set, most recent first. One per session,
/// independent of which room is open.
#[derive(Debug, Default)]
pub(crate) struct NotificationSet {
    items: Vec<Notification>,
}

impl NotificationSet {
    /// Replaces the set with the server's unread backlog.
    pub fn seed(&mut self, items: Vec<Notification>) {
        self.items = items;
    }

    /// Prepends a pushed notification. Dedup is by id only; two independent
    /// events may legitimately share their display text.
    pub fn push(&mut self, notification: Notification) -> bool {
        if self.items.iter().any(|n| n.id == notification.id) {
            return false;
        }
        self.items.insert(0, notification);
        true
    }

    /// Flips the read flag. Returns false when the id is unknown or already
    /// read, letting the caller suppress a duplicate persistence ack.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.items.iter_mut().find(|n| &n.id == id) {
            Some(notification) if !notification.read => {
                notification.read = true;
                true
            }
            _ => false,
        }
    }

    /// Flips every unread flag; returns whether anything changed.
    pub fn mark_all_read(&mut self) -> bool {
        let mut changed = false;
        for notification in &mut self.items {
            if !notification.read {
                notification.read = true;
                changed = true;
            }
        }
        changed
    }

    /// Unread MESSAGE notifications cleared by opening `room`: the room id
    /// matches and the sender is the room's peer.
    pub fn unread_for_room(&self, room: &RoomId, peer: &UserId) -> Vec<NotificationId> {
        self.items
            .iter()
            .filter(|n| {
                !n.read
                    && n.kind == NotificationKind::Message
                    && n.room_id.as_ref() == Some(room)
                    && &n.sender_id == peer
            })
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.items.clone()
    }
}

#[cfg(test)]
#[path = "tests/notify_tests.rs"]
mod tests;
