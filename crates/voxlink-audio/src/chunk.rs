use crate::error::EncodeError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::stream::{self, StreamExt, TryStreamExt};

/// Default raw bytes per upload chunk. Base64 expands 3 bytes to 4
/// characters, so 24 KiB of audio becomes exactly 32 KiB of encoded
/// payload per append event. Smaller chunks reduce head-of-line latency at
/// the cost of per-chunk overhead.
pub const DEFAULT_CHUNK_SIZE: usize = 24 * 1024;

/// Splits a buffer into ordered, size-bounded chunks.
///
/// Ordering is the contract: the wire protocol carries no chunk numbering,
/// the receiver relies purely on append order.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    let size = chunk_size.max(1);
    data.chunks(size).map(<[u8]>::to_vec).collect()
}

/// Reassembles received deltas, in receipt order, into one contiguous
/// buffer.
pub fn join_fragments<T: AsRef<[u8]>>(fragments: &[T]) -> Vec<u8> {
    let total = fragments.iter().map(|f| f.as_ref().len()).sum();
    let mut joined = Vec::with_capacity(total);
    for fragment in fragments {
        joined.extend_from_slice(fragment.as_ref());
    }
    joined
}

/// Base64-encodes chunks on a small bounded worker pool.
///
/// Encoding is pure and order-independent so it may run in parallel, but
/// `buffered` yields results in submission order, so the caller can
/// transmit them serially without re-sorting.
pub async fn encode_chunks(
    chunks: Vec<Vec<u8>>,
    workers: usize,
) -> Result<Vec<String>, EncodeError> {
    stream::iter(chunks)
        .map(|chunk| tokio::task::spawn_blocking(move || BASE64.encode(chunk)))
        .buffered(workers.max(1))
        .try_collect()
        .await
        .map_err(EncodeError::from)
}
