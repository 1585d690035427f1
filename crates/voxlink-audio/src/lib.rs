//! Audio transcoding and chunking for the voxlink relay.
//!
//! Conversion between the inbound message codec, the canonical streaming
//! format and the outbound delivery codec is delegated to an external
//! `ffmpeg` process invoked as a black box: bytes in, bytes in the target
//! format out, or a single failure reported upward. The caller decides on
//! fallback; this crate never retries.
//!
//! Chunking splits a canonical buffer into ordered, size-bounded pieces
//! for upload and reassembles received deltas into one contiguous buffer.

mod chunk;
mod error;
mod transcode;

pub use chunk::{encode_chunks, join_fragments, split_chunks, DEFAULT_CHUNK_SIZE};
pub use error::{EncodeError, TranscodeError};
pub use transcode::Transcoder;
