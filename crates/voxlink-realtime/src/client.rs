use crate::error::SessionError;
use crate::protocol::{ClientEvent, ConfigurePayload, ServerEvent};
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;
use voxlink_types::SessionSettings;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Where and how to reach the streaming service.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    /// WebSocket URL, e.g. `wss://service.example/v1/stream`.
    pub url: String,
    /// Bearer credential for the handshake.
    pub api_key: String,
    /// Model selector appended as a query parameter.
    pub model: String,
}

/// Connection lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Configuring,
    Ready,
    Closed,
    Errored,
}

/// One persistent session on the streaming service.
///
/// Created lazily on first use for a counterparty and reusable across
/// exchanges, but exclusively owned by at most one in-flight exchange at a
/// time (enforced by [`crate::SessionRegistry`]). Once the format
/// descriptors are pushed they are immutable for the session's lifetime;
/// reconfiguration requires a new session.
#[derive(Debug)]
pub struct SessionClient {
    id: String,
    state: ConnectionState,
    settings: SessionSettings,
    created_at: DateTime<Utc>,
    sink: WsSink,
    stream: WsStream,
}

impl SessionClient {
    /// Opens the socket, pushes the session configuration and waits for
    /// the configuration acknowledgment, all inside `handshake_deadline`.
    ///
    /// Fails fast: no silent retry. The caller decides whether to retry
    /// once or fall back.
    pub async fn connect(
        endpoint: &ServiceEndpoint,
        settings: SessionSettings,
        handshake_deadline: Duration,
    ) -> Result<Self, SessionError> {
        let request = build_request(endpoint)?;
        debug!(url = %endpoint.url, model = %endpoint.model, "connecting session");

        let (socket, _) = connect_async(request).await?;
        let (sink, stream) = socket.split();

        let mut client = Self {
            id: Uuid::new_v4().to_string(),
            state: ConnectionState::Configuring,
            settings,
            created_at: Utc::now(),
            sink,
            stream,
        };

        client
            .send_raw(&ClientEvent::Configure {
                session: ConfigurePayload::from(&client.settings),
            })
            .await?;

        let started = Instant::now();
        loop {
            let remaining = handshake_deadline.saturating_sub(started.elapsed());
            match client.next_event(remaining).await? {
                ServerEvent::SessionCreated => {
                    debug!(session = %client.id, "session created");
                }
                ServerEvent::SessionUpdated => {
                    client.state = ConnectionState::Ready;
                    info!(session = %client.id, "session configured and ready");
                    return Ok(client);
                }
                ServerEvent::ServiceError(message) => {
                    client.state = ConnectionState::Errored;
                    return Err(SessionError::Remote(message));
                }
                other => {
                    debug!(session = %client.id, kind = other.kind(), "ignoring event during configure");
                }
            }
        }
    }

    /// Sends one event. Fire-and-forget, but fails synchronously if the
    /// session is not `Ready`.
    pub async fn send(&mut self, event: &ClientEvent) -> Result<(), SessionError> {
        if self.state != ConnectionState::Ready {
            return Err(SessionError::NotReady(self.state));
        }
        self.send_raw(event).await
    }

    async fn send_raw(&mut self, event: &ClientEvent) -> Result<(), SessionError> {
        let json = serde_json::to_string(event)
            .map_err(|e| SessionError::Decode(format!("event serialization failed: {e}")))?;
        if let Err(e) = self.sink.send(Message::Text(json)).await {
            self.state = ConnectionState::Errored;
            return Err(SessionError::Connection(e));
        }
        Ok(())
    }

    /// Waits for the next inbound event, at most `deadline`.
    ///
    /// This is the component's only suspension point. Deadline expiry,
    /// transport errors and socket closure all mark the session unusable;
    /// a new session must be created.
    pub async fn next_event(&mut self, deadline: Duration) -> Result<ServerEvent, SessionError> {
        let deadline_at = Instant::now() + deadline;
        loop {
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            let message = match tokio::time::timeout(remaining, self.stream.next()).await {
                Ok(message) => message,
                Err(_) => {
                    self.state = ConnectionState::Errored;
                    return Err(SessionError::Timeout);
                }
            };

            match message {
                None => {
                    self.state = ConnectionState::Closed;
                    return Err(SessionError::Closed);
                }
                Some(Err(e)) => {
                    self.state = ConnectionState::Errored;
                    return Err(SessionError::Connection(e));
                }
                Some(Ok(Message::Text(text))) => match ServerEvent::parse(&text) {
                    Ok(event) => return Ok(event),
                    Err(e) => {
                        warn!(session = %self.id, error = %e, "undecodable inbound frame");
                        self.state = ConnectionState::Errored;
                        return Err(e);
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(session = %self.id, ?frame, "close frame received");
                    self.state = ConnectionState::Closed;
                    return Err(SessionError::Closed);
                }
                // Ping/pong are handled by the transport; binary frames are
                // not part of this protocol.
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Best-effort close. Never blocks the caller on the remote side.
    pub async fn close(&mut self) {
        let _ = self.sink.close().await;
        if self.state != ConnectionState::Errored {
            self.state = ConnectionState::Closed;
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn build_request(endpoint: &ServiceEndpoint) -> Result<tungstenite::http::Request<()>, SessionError> {
    let url = format!("{}?model={}", endpoint.url, endpoint.model);
    let uri: tungstenite::http::Uri = url
        .parse()
        .map_err(|e| SessionError::Handshake(format!("invalid service url: {e}")))?;
    let host = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .ok_or_else(|| SessionError::Handshake("service url has no host".to_string()))?;

    tungstenite::http::Request::builder()
        .uri(uri)
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tungstenite::handshake::client::generate_key(),
        )
        .header("Authorization", format!("Bearer {}", endpoint.api_key))
        .body(())
        .map_err(|e| SessionError::Handshake(e.to_string()))
}
