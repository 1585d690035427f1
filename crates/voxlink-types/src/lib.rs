//! Shared types for the voxlink speech-to-speech relay.
//!
//! This crate provides the foundational types used across all voxlink
//! crates: audio format descriptors, session configuration, latency
//! reporting, and the uniform relay reply returned to the transport layer.
//!
//! No crate in the workspace depends on anything *except* `voxlink-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

mod audio;
mod reply;
mod session;

pub use audio::{AudioCodec, AudioSpec};
pub use reply::{FallbackKind, FallbackReason, LatencyReport, RelayReply, ReplySource};
pub use session::{SessionSettings, VadSettings};
