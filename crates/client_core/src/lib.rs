//! Client-side realtime messaging core: one gateway connection per session,
//! room-scoped chat logs with optimistic-send reconciliation, and a
//! session-wide notification fan-in synced with the persistence service.

use std::{sync::Arc, time::Instant};

use chrono::Utc;
use shared::{
    domain::{NotificationId, RoomId, UserId},
    protocol::{ChatMessage, ClientFrame, GatewayEvent, Notification},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod error;
pub mod notify;
mod presence;
mod rooms;
pub mod store;
pub mod transport;

pub use error::ClientError;
pub use notify::{HttpReadStateStore, ReadStateStore};
pub use transport::{Connection, ConnectionState, TransportEvent};

use notify::NotificationSet;
use presence::TypingThrottle;
use rooms::{Activation, RoomTracker};
use store::MessageStore;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One authenticated client instance. Exactly one live gateway connection
/// is associated with a session at a time.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    /// Bearer credential, opaque to this core; minted and refreshed by the
    /// identity collaborator.
    pub auth_token: String,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base url of the messaging gateway (http(s) or ws(s) scheme).
    pub gateway_url: String,
    /// Base url of the persistence/identity service.
    pub api_url: String,
}

/// Events surfaced to the consuming UI.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConnectionChanged(ConnectionState),
    RoomLogChanged {
        room_id: RoomId,
    },
    NotificationsChanged,
    Typing {
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    },
}

#[derive(Default)]
struct ClientState {
    rooms: RoomTracker,
    store: MessageStore,
    notifications: NotificationSet,
    typing: TypingThrottle,
}

/// Facade over the messaging core, explicitly constructed and owned by the
/// session rather than shared module-wide. Lifecycle: [`connect`] at login,
/// [`disconnect`] at logout.
///
/// [`connect`]: MessagingClient::connect
/// [`disconnect`]: MessagingClient::disconnect
pub struct MessagingClient {
    session: Session,
    connection: Arc<Connection>,
    read_state: Arc<dyn ReadStateStore>,
    inner: Mutex<ClientState>,
    events: broadcast::Sender<ClientEvent>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl MessagingClient {
    pub fn new(config: &ClientConfig, session: Session) -> Arc<Self> {
        let read_state = Arc::new(HttpReadStateStore::new(&config.api_url, &session.auth_token));
        Self::with_read_state(config, session, read_state)
    }

    pub fn with_read_state(
        config: &ClientConfig,
        session: Session,
        read_state: Arc<dyn ReadStateStore>,
    ) -> Arc<Self> {
        let connection = Connection::new(&config.gateway_url, session.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            session,
            connection,
            read_state,
            inner: Mutex::new(ClientState::default()),
            events,
            dispatch: Mutex::new(None),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Opens the transport and seeds the unread notification set.
    ///
    /// A rejected handshake (invalid or expired token) is fatal for the
    /// session and propagates; a failed unread fetch only logs and leaves
    /// the set empty.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let receiver = self.connection.subscribe();
        self.connection.connect().await?;

        {
            let mut dispatch = self.dispatch.lock().await;
            if dispatch.is_none() {
                let client = Arc::clone(self);
                *dispatch = Some(tokio::spawn(client.dispatch_events(receiver)));
            }
        }
        let _ = self
            .events
            .send(ClientEvent::ConnectionChanged(ConnectionState::Connected));

        match self.read_state.fetch_unread().await {
            Ok(items) => {
                self.inner.lock().await.notifications.seed(items);
                let _ = self.events.send(ClientEvent::NotificationsChanged);
            }
            Err(err) => {
                warn!(%err, "notifications: initial unread fetch failed; starting empty");
            }
        }
        Ok(())
    }

    pub async fn disconnect(&self) {
        if let Some(handle) = self.dispatch.lock().await.take() {
            handle.abort();
        }
        self.connection.close().await;
        let _ = self
            .events
            .send(ClientEvent::ConnectionChanged(ConnectionState::Disconnected));
    }

    /// Computes the deterministic direct room with `peer` and activates it.
    pub async fn open_chat(&self, peer: UserId) -> Result<RoomId, ClientError> {
        let room = RoomId::direct(&self.session.user_id, &peer);
        self.set_active_room(room.clone(), Some(peer)).await?;
        Ok(room)
    }

    /// Switches the active room: best-effort leave for the previous room,
    /// join plus history request for the new one, and auto-acknowledgement
    /// of unread MESSAGE notifications targeting the newly opened chat.
    /// Activating the already-active room is a no-op.
    pub async fn set_active_room(
        &self,
        room: RoomId,
        peer: Option<UserId>,
    ) -> Result<(), ClientError> {
        let (left, acked) = {
            let mut inner = self.inner.lock().await;
            match inner.rooms.activate(room.clone(), peer.clone()) {
                Activation::Unchanged => return Ok(()),
                Activation::Switched { left } => {
                    let mut acked = Vec::new();
                    if let Some(peer) = &peer {
                        for id in inner.notifications.unread_for_room(&room, peer) {
                            if inner.notifications.mark_read(&id) {
                                acked.push(id);
                            }
                        }
                    }
                    (left, acked)
                }
            }
        };

        if let Some(left_room) = left {
            // The server owns membership cleanup; a lost leave intent is fine.
            if let Err(err) = self
                .connection
                .send(&ClientFrame::LeaveRoom {
                    room_id: left_room.clone(),
                    user_id: self.session.user_id.clone(),
                })
                .await
            {
                debug!(room_id = %left_room, %err, "rooms: leave intent not delivered");
            }
        }

        self.connection
            .send(&ClientFrame::JoinRoom {
                room_id: room.clone(),
                user_id: self.session.user_id.clone(),
            })
            .await?;
        self.connection
            .send(&ClientFrame::LoadMessages {
                room_id: room.clone(),
            })
            .await?;
        info!(room_id = %room, "rooms: activated");

        if !acked.is_empty() {
            let _ = self.events.send(ClientEvent::NotificationsChanged);
            for id in &acked {
                self.ack_read_best_effort(id).await;
            }
        }
        Ok(())
    }

    /// Optimistically appends the message to the active room's log, then
    /// dispatches it fire-and-forget. A synchronous transport error (e.g.
    /// [`ClientError::NotConnected`]) propagates so the caller can surface a
    /// send-failed state; the optimistic entry stays either way.
    pub async fn send_message(&self, content: &str) -> Result<(), ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(());
        }

        let message = {
            let mut inner = self.inner.lock().await;
            let (room, peer) = match (inner.rooms.active(), inner.rooms.peer()) {
                (Some(room), Some(peer)) => (room.clone(), peer.clone()),
                _ => return Err(ClientError::NoActiveRoom),
            };
            let message = ChatMessage {
                id: None,
                room_id: room,
                sender_id: self.session.user_id.clone(),
                receiver_id: peer,
                content: content.to_string(),
                read: false,
                created_at: Some(Utc::now()),
                updated_at: None,
            };
            inner.store.append_pending(message.clone());
            message
        };
        let _ = self.events.send(ClientEvent::RoomLogChanged {
            room_id: message.room_id.clone(),
        });

        self.connection
            .send(&ClientFrame::SendMessage(message))
            .await
    }

    pub async fn room_log(&self, room: &RoomId) -> Vec<ChatMessage> {
        self.inner.lock().await.store.messages(room)
    }

    pub async fn active_room(&self) -> Option<RoomId> {
        self.inner.lock().await.rooms.active().cloned()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().await.notifications.snapshot()
    }

    /// Optimistic-then-persist: the local flag flips immediately and the
    /// remote ack is best-effort with no rollback. Idempotent; a second call
    /// for the same id suppresses the duplicate ack.
    pub async fn mark_as_read(&self, id: &NotificationId) {
        let changed = self.inner.lock().await.notifications.mark_read(id);
        if !changed {
            return;
        }
        let _ = self.events.send(ClientEvent::NotificationsChanged);
        self.ack_read_best_effort(id).await;
    }

    /// Flips every known notification and issues exactly one bulk
    /// persistence call.
    pub async fn mark_all_as_read(&self) {
        let changed = self.inner.lock().await.notifications.mark_all_read();
        if !changed {
            return;
        }
        let _ = self.events.send(ClientEvent::NotificationsChanged);
        if let Err(err) = self.read_state.ack_read_all().await {
            warn!(%err, "notifications: bulk read ack failed; keeping local state");
        }
    }

    /// Throttled typing signal for the active room. Never queued while
    /// disconnected; typing state is stale after any delay.
    pub async fn set_typing(&self, is_typing: bool) -> Result<(), ClientError> {
        let (room, allowed) = {
            let mut inner = self.inner.lock().await;
            let Some(room) = inner.rooms.active().cloned() else {
                return Err(ClientError::NoActiveRoom);
            };
            let allowed = inner.typing.should_send(&room, is_typing, Instant::now());
            (room, allowed)
        };
        if !allowed {
            return Ok(());
        }
        match self
            .connection
            .send(&ClientFrame::Typing {
                room_id: room.clone(),
                user_id: self.session.user_id.clone(),
                is_typing,
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(ClientError::NotConnected) => {
                debug!(room_id = %room, "presence: dropping typing signal while disconnected");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn ack_read_best_effort(&self, id: &NotificationId) {
        if let Err(err) = self.read_state.ack_read(id).await {
            warn!(notification_id = %id, %err, "notifications: read ack failed; keeping local state");
        }
    }

    async fn dispatch_events(
        self: Arc<Self>,
        mut receiver: broadcast::Receiver<TransportEvent>,
    ) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.handle_transport_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dispatch: transport events dropped after lag");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { reconnect } => {
                let _ = self
                    .events
                    .send(ClientEvent::ConnectionChanged(ConnectionState::Connected));
                if reconnect {
                    self.rejoin_active_room().await;
                }
            }
            TransportEvent::Disconnected => {
                let _ = self.events.send(ClientEvent::ConnectionChanged(
                    ConnectionState::Disconnected,
                ));
            }
            TransportEvent::Event(event) => self.handle_gateway_event(event).await,
        }
    }

    /// Server-side room membership does not survive a transport reset, so a
    /// reconnect re-emits the join and requests history again; the wholesale
    /// history replace keeps redelivery idempotent.
    async fn rejoin_active_room(&self) {
        let room = self.inner.lock().await.rooms.rejoin_target();
        let Some(room) = room else { return };

        let frames = [
            ClientFrame::JoinRoom {
                room_id: room.clone(),
                user_id: self.session.user_id.clone(),
            },
            ClientFrame::LoadMessages {
                room_id: room.clone(),
            },
        ];
        for frame in &frames {
            if let Err(err) = self.connection.send(frame).await {
                warn!(room_id = %room, %err, "rooms: re-join after reconnect failed");
                return;
            }
        }
        info!(room_id = %room, "rooms: re-joined after reconnect");
    }

    async fn handle_gateway_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::ChatHistory(messages) => {
                let applied = {
                    let mut inner = self.inner.lock().await;
                    let payload_room = messages.first().map(|m| m.room_id.clone());
                    match inner.rooms.accept_history(payload_room.as_ref()) {
                        Ok(room) => {
                            inner.store.load_history(&room, messages);
                            Some(room)
                        }
                        Err(err) => {
                            debug!(%err, "store: discarding history snapshot");
                            None
                        }
                    }
                };
                if let Some(room_id) = applied {
                    let _ = self.events.send(ClientEvent::RoomLogChanged { room_id });
                }
            }
            GatewayEvent::ReceiveMessage(message) => {
                let applied = {
                    let mut inner = self.inner.lock().await;
                    if inner.rooms.active() != Some(&message.room_id) {
                        // Cross-room deliveries only surface as notifications.
                        debug!(room_id = %message.room_id, "store: ignoring message outside the active room");
                        None
                    } else {
                        let room_id = message.room_id.clone();
                        inner.store.apply_incoming(message).then_some(room_id)
                    }
                };
                if let Some(room_id) = applied {
                    let _ = self.events.send(ClientEvent::RoomLogChanged { room_id });
                }
            }
            GatewayEvent::Notification(notification) => {
                let (changed, acked) = {
                    let mut inner = self.inner.lock().await;
                    let changed = inner.notifications.push(notification);
                    let mut acked = Vec::new();
                    if changed {
                        // The chat for this sender may already be open, in
                        // which case its badge clears immediately.
                        if let (Some(room), Some(peer)) = (
                            inner.rooms.active().cloned(),
                            inner.rooms.peer().cloned(),
                        ) {
                            for id in inner.notifications.unread_for_room(&room, &peer) {
                                if inner.notifications.mark_read(&id) {
                                    acked.push(id);
                                }
                            }
                        }
                    }
                    (changed, acked)
                };
                if changed {
                    let _ = self.events.send(ClientEvent::NotificationsChanged);
                }
                for id in &acked {
                    self.ack_read_best_effort(id).await;
                }
            }
            GatewayEvent::Typing {
                room_id,
                user_id,
                is_typing,
            } => {
                let active = self.inner.lock().await.rooms.active().cloned();
                if active.as_ref() != Some(&room_id) {
                    // Stale by definition; discard instead of buffering.
                    debug!(room_id = %room_id, "presence: discarding typing signal for inactive room");
                    return;
                }
                let _ = self.events.send(ClientEvent::Typing {
                    room_id,
                    user_id,
                    is_typing,
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
