use std::{sync::Arc, time::Duration};

use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use shared::protocol::{ClientFrame, GatewayEvent};
use tokio::{
    net::TcpStream,
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::{error::ClientError, Session};

pub(crate) const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
pub(crate) const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
const EVENT_CHANNEL_CAPACITY: usize = 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, tungstenite::Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The session token was rejected; reconnection stopped for good.
    Failed,
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Handshake completed. After a reconnect the server has forgotten room
    /// membership and may redeliver state; consumers handle both
    /// idempotently.
    Connected { reconnect: bool },
    Disconnected,
    Event(GatewayEvent),
}

/// The one persistent gateway connection of a session.
///
/// Owns the socket and a supervisor task that reconnects with exponential
/// backoff after unexpected disconnects. Sends fail fast while the socket is
/// down; inbound frames fan out over a broadcast channel in arrival order.
pub struct Connection {
    gateway_url: String,
    session: Session,
    writer: Mutex<Option<WsSink>>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<TransportEvent>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    pub fn new(gateway_url: impl Into<String>, session: Session) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            gateway_url: gateway_url.into(),
            session,
            writer: Mutex::new(None),
            state,
            events,
            supervisor: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Opens the transport and authenticates with the session identity.
    ///
    /// A rejected handshake surfaces as [`ClientError::Connection`] and is
    /// not retried; later network failures are handled by the supervisor.
    /// Calling this while already connected is a no-op. After the
    /// supervisor has parked the session as [`ConnectionState::Failed`], a
    /// fresh connect starts over with a new handshake.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut supervisor = self.supervisor.lock().await;
        match supervisor.as_ref() {
            Some(handle) if !handle.is_finished() => return Ok(()),
            _ => {
                supervisor.take();
            }
        }

        self.state.send_replace(ConnectionState::Connecting);
        let reader = match self.open_stream().await {
            Ok(reader) => reader,
            Err(err) => {
                self.state.send_replace(if err.is_fatal() {
                    ConnectionState::Failed
                } else {
                    ConnectionState::Disconnected
                });
                return Err(err);
            }
        };

        self.state.send_replace(ConnectionState::Connected);
        info!(user_id = %self.session.user_id, "transport: connected");
        let _ = self
            .events
            .send(TransportEvent::Connected { reconnect: false });

        let connection = Arc::clone(self);
        *supervisor = Some(tokio::spawn(connection.run(reader)));
        Ok(())
    }

    /// Tears the connection down and stops the supervisor. Part of the
    /// session lifecycle; a closed connection can be connected again.
    pub async fn close(&self) {
        if let Some(handle) = self.supervisor.lock().await.take() {
            handle.abort();
        }
        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.send(tungstenite::Message::Close(None)).await;
        }
        self.state.send_replace(ConnectionState::Disconnected);
        let _ = self.events.send(TransportEvent::Disconnected);
    }

    /// Serializes one frame onto the wire. Fails fast with
    /// [`ClientError::NotConnected`] while the transport is down rather than
    /// buffering; queued resends are a caller-level decision.
    pub async fn send(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        let text = serde_json::to_string(frame)
            .map_err(|err| ClientError::transport(format!("failed to encode frame: {err}")))?;

        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        if let Err(err) = sink.send(tungstenite::Message::Text(text)).await {
            writer.take();
            return Err(ClientError::transport(err.to_string()));
        }
        Ok(())
    }

    async fn open_stream(&self) -> Result<WsSource, ClientError> {
        let endpoint = ws_endpoint(&self.gateway_url, &self.session)?;
        let (stream, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(map_handshake_error)?;
        let (sink, reader) = stream.split();
        *self.writer.lock().await = Some(sink);
        Ok(reader)
    }

    async fn run(self: Arc<Self>, mut reader: WsSource) {
        loop {
            self.read_until_close(&mut reader).await;

            self.writer.lock().await.take();
            self.state.send_replace(ConnectionState::Disconnected);
            let _ = self.events.send(TransportEvent::Disconnected);

            match self.reconnect_with_backoff().await {
                Some(next_reader) => {
                    reader = next_reader;
                    let _ = self
                        .events
                        .send(TransportEvent::Connected { reconnect: true });
                }
                None => {
                    self.state.send_replace(ConnectionState::Failed);
                    return;
                }
            }
        }
    }

    async fn read_until_close(&self, reader: &mut WsSource) {
        while let Some(message) = reader.next().await {
            match message {
                Ok(tungstenite::Message::Text(text)) => {
                    match serde_json::from_str::<GatewayEvent>(&text) {
                        Ok(event) => {
                            let _ = self.events.send(TransportEvent::Event(event));
                        }
                        Err(err) => {
                            // Malformed payloads are dropped, never fatal.
                            warn!(%err, "transport: dropping malformed gateway payload");
                        }
                    }
                }
                Ok(tungstenite::Message::Close(_)) => {
                    info!("transport: gateway closed the connection");
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "transport: receive failed");
                    return;
                }
            }
        }
    }

    /// Unbounded retries while the session stays valid; a handshake
    /// rejection (token expired mid-session) stops reconnection for good.
    async fn reconnect_with_backoff(&self) -> Option<WsSource> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let delay = reconnect_delay(attempt);
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "transport: waiting before reconnect"
            );
            tokio::time::sleep(delay).await;

            self.state.send_replace(ConnectionState::Connecting);
            match self.open_stream().await {
                Ok(reader) => {
                    self.state.send_replace(ConnectionState::Connected);
                    info!(attempt, "transport: reconnected");
                    return Some(reader);
                }
                Err(err) if err.is_fatal() => {
                    warn!(%err, "transport: session no longer authorized; stopping reconnection");
                    return None;
                }
                Err(err) => {
                    warn!(attempt, %err, "transport: reconnect attempt failed");
                    self.state.send_replace(ConnectionState::Disconnected);
                }
            }
        }
    }
}

pub(crate) fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5);
    let secs = RECONNECT_BASE_DELAY
        .as_secs()
        .saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_secs(secs.min(RECONNECT_MAX_DELAY.as_secs()))
}

/// Builds the authenticated websocket endpoint from the gateway base url,
/// mapping http(s) to ws(s).
pub(crate) fn ws_endpoint(gateway_url: &str, session: &Session) -> Result<Url, ClientError> {
    let base = gateway_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(ClientError::connection(format!(
            "gateway url must start with http(s):// or ws(s)://, got '{gateway_url}'"
        )));
    };

    let mut endpoint = Url::parse(&format!("{base}/ws"))
        .map_err(|err| ClientError::connection(format!("invalid gateway url: {err}")))?;
    endpoint
        .query_pairs_mut()
        .append_pair("userId", session.user_id.as_str())
        .append_pair("token", &session.auth_token);
    Ok(endpoint)
}

fn map_handshake_error(err: tungstenite::Error) -> ClientError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            ClientError::connection(format!(
                "handshake rejected with status {}",
                response.status()
            ))
        }
        other => ClientError::transport(other.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
