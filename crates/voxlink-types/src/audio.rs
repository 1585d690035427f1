//! Audio format descriptors.
//!
//! An [`AudioSpec`] describes one concrete encoding on either edge of the
//! transcoder: the inbound message codec, the canonical wire format the
//! streaming service requires, or the outbound delivery codec.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Codecs the relay touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// OGG container with Opus audio. Inbound voice notes and outbound
    /// delivery use this.
    OggOpus,
    /// Raw signed 16-bit little-endian PCM. The canonical wire format.
    Pcm16,
    /// MPEG layer III. Produced by the speech-synthesis fallback.
    Mp3,
}

impl AudioCodec {
    /// Short name used in wire format descriptors and temp file suffixes.
    pub fn short_name(self) -> &'static str {
        match self {
            AudioCodec::OggOpus => "ogg_opus",
            AudioCodec::Pcm16 => "pcm_s16le",
            AudioCodec::Mp3 => "mp3",
        }
    }

    /// File extension for temp files handed to the external transcoder.
    pub fn extension(self) -> &'static str {
        match self {
            AudioCodec::OggOpus => "ogg",
            AudioCodec::Pcm16 => "raw",
            AudioCodec::Mp3 => "mp3",
        }
    }
}

/// A concrete audio encoding: codec, sample rate and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioSpec {
    pub codec: AudioCodec,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (1 = mono).
    pub channels: u8,
}

impl AudioSpec {
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u8) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
        }
    }

    /// Canonical input format required by the streaming service:
    /// PCM s16le, 16 kHz, mono.
    pub fn canonical_input() -> Self {
        Self::new(AudioCodec::Pcm16, 16_000, 1)
    }

    /// Canonical output format produced by the streaming service:
    /// PCM s16le, 24 kHz, mono.
    pub fn canonical_output() -> Self {
        Self::new(AudioCodec::Pcm16, 24_000, 1)
    }

    /// Outbound delivery format: OGG/Opus at 48 kHz, mono.
    pub fn delivery() -> Self {
        Self::new(AudioCodec::OggOpus, 48_000, 1)
    }

    /// Wire format descriptor, e.g. `pcm_s16le_16000`.
    pub fn descriptor(&self) -> String {
        format!("{}_{}", self.codec.short_name(), self.sample_rate)
    }
}

impl fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}Hz {}ch",
            self.codec.short_name(),
            self.sample_rate,
            self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_descriptors() {
        assert_eq!(AudioSpec::canonical_input().descriptor(), "pcm_s16le_16000");
        assert_eq!(
            AudioSpec::canonical_output().descriptor(),
            "pcm_s16le_24000"
        );
    }

    #[test]
    fn test_codec_serde_snake_case() {
        let json = serde_json::to_string(&AudioCodec::OggOpus).unwrap();
        assert_eq!(json, "\"ogg_opus\"");
    }
}
