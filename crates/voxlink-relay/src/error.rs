use thiserror::Error;
use voxlink_audio::{EncodeError, TranscodeError};
use voxlink_realtime::SessionError;

/// Errors surfaced while running one exchange.
///
/// Most variants never reach the caller of the facade: they are mapped to
/// a [`voxlink_types::FallbackReason`] and absorbed by the fallback path.
/// Only [`RelayError::Busy`] propagates, since a concurrent exchange for
/// the same counterparty is a caller-side sequencing problem, not a
/// service failure.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The counterparty already has an exchange in flight.
    #[error("an exchange is already in flight for {0}")]
    Busy(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The exchange completed but carried no text and no audio.
    #[error("service response carried no text and no audio")]
    EmptyResponse,
}
