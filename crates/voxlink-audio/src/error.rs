use std::time::Duration;
use thiserror::Error;

/// Errors from the external transcoding process.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The transcoder exited with a non-zero status.
    #[error("transcoder exited with status {status}: {stderr}")]
    ProcessFailed { status: i32, stderr: String },

    /// The transcoder did not finish inside the hard timeout.
    #[error("transcoder timed out after {0:?}")]
    Timeout(Duration),

    /// Input exceeds the size guard.
    #[error("audio input exceeds maximum size: {len} bytes (limit: {limit} bytes)")]
    InputTooLarge { len: usize, limit: usize },

    /// Spawning the process or touching the temp files failed.
    #[error("transcoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the parallel chunk-encoding pool.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("chunk encode worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
