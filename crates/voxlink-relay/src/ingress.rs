//! Inbound audio pipeline: transcode, chunk, encode, upload.
//!
//! Steps run in a fixed order per message: transcode to the canonical
//! format, split into size-bounded chunks, base64-encode (parallel but
//! order-preserving), then transmit one `input.append` per chunk followed
//! by exactly one `input.commit` and one `response.request`. Transmission
//! is serialized; append order is the wire's only ordering contract.

use crate::error::RelayError;
use crate::latency::LatencyGovernor;
use tracing::{debug, info};
use voxlink_audio::{encode_chunks, split_chunks, Transcoder};
use voxlink_realtime::{ClientEvent, SessionClient};
use voxlink_types::{AudioCodec, AudioSpec};

/// Per-message upload statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngressStats {
    /// Canonical bytes produced by the ingress transcode.
    pub canonical_bytes: usize,
    /// Number of `input.append` events sent.
    pub chunks_sent: usize,
}

/// Uploads one inbound audio message through an open session.
pub struct IngressPipeline {
    transcoder: Transcoder,
    chunk_size: usize,
    encode_workers: usize,
}

impl IngressPipeline {
    pub fn new(transcoder: Transcoder, chunk_size: usize, encode_workers: usize) -> Self {
        Self {
            transcoder,
            chunk_size,
            encode_workers,
        }
    }

    /// Runs the full upload sequence for `audio` and requests a response.
    pub async fn run(
        &self,
        client: &mut SessionClient,
        audio: &[u8],
        source_spec: &AudioSpec,
        governor: &mut LatencyGovernor,
    ) -> Result<IngressStats, RelayError> {
        let target = client.settings().input_format;
        let canonical = if *source_spec == target {
            audio.to_vec()
        } else {
            self.transcoder.transcode(audio, source_spec, &target).await?
        };
        governor.mark_ingress_done();

        let chunks = split_chunks(&canonical, self.chunk_size);
        let payloads = encode_chunks(chunks, self.encode_workers).await?;
        let chunks_sent = payloads.len();
        debug!(
            bytes = canonical.len(),
            chunks = chunks_sent,
            "uploading canonical audio"
        );

        for payload in payloads {
            client.send(&ClientEvent::InputAppend { payload }).await?;
        }
        client.send(&ClientEvent::InputCommit).await?;
        client.send(&ClientEvent::ResponseRequest).await?;
        governor.mark_upload_done();

        info!(
            session = %client.id(),
            bytes = canonical.len(),
            chunks = chunks_sent,
            "input committed, response requested"
        );
        Ok(IngressStats {
            canonical_bytes: canonical.len(),
            chunks_sent,
        })
    }
}

/// The format an inbound message arrives in, by codec.
///
/// Self-describing containers carry their own parameters; the rates here
/// are what the delivery channel produces in practice.
pub fn source_spec(codec: AudioCodec) -> AudioSpec {
    match codec {
        AudioCodec::OggOpus => AudioSpec::delivery(),
        AudioCodec::Pcm16 => AudioSpec::canonical_input(),
        AudioCodec::Mp3 => AudioSpec::new(AudioCodec::Mp3, 44_100, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_spec_covers_all_codecs() {
        assert_eq!(source_spec(AudioCodec::OggOpus), AudioSpec::delivery());
        assert_eq!(
            source_spec(AudioCodec::Pcm16),
            AudioSpec::canonical_input()
        );
        assert_eq!(source_spec(AudioCodec::Mp3).codec, AudioCodec::Mp3);
    }
}
