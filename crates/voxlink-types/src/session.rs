//! Session configuration pushed to the streaming service.
//!
//! A [`SessionSettings`] snapshot is immutable for the lifetime of a
//! session: the format descriptors it carries are what the event decoder
//! assumes for inbound audio deltas, so reconfiguration requires a new
//! session.

use crate::audio::AudioSpec;
use serde::{Deserialize, Serialize};

fn default_threshold() -> f32 {
    0.5
}

fn default_prefix_padding_ms() -> u32 {
    300
}

fn default_silence_duration_ms() -> u32 {
    500
}

/// Server-side voice-activity-detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadSettings {
    /// Energy threshold above which audio counts as speech.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Leading silence padding included before detected speech.
    #[serde(default = "default_prefix_padding_ms")]
    pub prefix_padding_ms: u32,
    /// Trailing silence duration that ends a turn.
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            prefix_padding_ms: default_prefix_padding_ms(),
            silence_duration_ms: default_silence_duration_ms(),
        }
    }
}

/// Configuration snapshot for one streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Enabled response modalities.
    #[serde(default = "default_modalities")]
    pub modalities: Vec<String>,
    /// Voice identity used for synthesized audio.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Canonical format for uploaded audio.
    #[serde(default = "AudioSpec::canonical_input")]
    pub input_format: AudioSpec,
    /// Canonical format for audio deltas received back.
    #[serde(default = "AudioSpec::canonical_output")]
    pub output_format: AudioSpec,
    /// Turn-detection thresholds.
    #[serde(default)]
    pub vad: VadSettings,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Hard cap on generated output tokens.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_modalities() -> Vec<String> {
    vec!["text".to_string(), "audio".to_string()]
}

fn default_voice() -> String {
    "coral".to_string()
}

fn default_temperature() -> f32 {
    0.8
}

fn default_max_output_tokens() -> u32 {
    4096
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            modalities: default_modalities(),
            voice: default_voice(),
            input_format: AudioSpec::canonical_input(),
            output_format: AudioSpec::canonical_output(),
            vad: VadSettings::default(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_requirements() {
        let settings = SessionSettings::default();
        assert_eq!(settings.input_format.sample_rate, 16_000);
        assert_eq!(settings.output_format.sample_rate, 24_000);
        assert_eq!(settings.vad.threshold, 0.5);
        assert_eq!(settings.modalities, vec!["text", "audio"]);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let settings: SessionSettings = serde_json::from_str("{\"voice\":\"verse\"}").unwrap();
        assert_eq!(settings.voice, "verse");
        assert_eq!(settings.max_output_tokens, 4096);
    }
}
