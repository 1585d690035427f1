//! Persistent streaming session layer for the voxlink relay.
//!
//! Owns the bidirectional socket to the conversational-audio service:
//! connect/configure handshake, fire-and-forget event sends, a
//! deadline-bounded inbound event stream, the response state machine that
//! accumulates streamed deltas, and a check-out/check-in session registry
//! that guarantees at most one in-flight exchange per session.

mod client;
mod error;
mod machine;
mod protocol;
mod registry;

pub use client::{ConnectionState, ServiceEndpoint, SessionClient};
pub use error::SessionError;
pub use machine::{drive, EventStateMachine, ExchangePhase, ResponseAccumulator};
pub use protocol::{ClientEvent, ConfigurePayload, ServerEvent};
pub use registry::SessionRegistry;
