use crate::client::ConnectionState;
use thiserror::Error;

/// Errors from the streaming session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Socket or handshake failure. Not retried here; one retry belongs to
    /// the caller.
    #[error("connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    /// The handshake request could not be built.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// `send` was called while the session was not ready.
    #[error("session not ready: state is {0:?}")]
    NotReady(ConnectionState),

    /// The remote side closed the socket.
    #[error("session closed by remote")]
    Closed,

    /// A suspension point exceeded its deadline.
    #[error("session deadline exceeded")]
    Timeout,

    /// The remote side reported a protocol error event.
    #[error("service error: {0}")]
    Remote(String),

    /// A known event arrived in an order the protocol forbids.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// An inbound event could not be decoded.
    #[error("undecodable event: {0}")]
    Decode(String),

    /// A session was checked out while an exchange was already in flight
    /// on it. This is a programming error in the caller, not a race.
    #[error("session for {0} already has an exchange in flight")]
    Busy(String),
}
