//! Relay configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use voxlink_audio::DEFAULT_CHUNK_SIZE;
use voxlink_types::SessionSettings;

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Streaming service connection settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Session defaults pushed at configure time.
    #[serde(default)]
    pub session: SessionSettings,

    /// Audio pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Deadlines and the latency budget.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Fallback collaborator settings.
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Streaming service endpoint and credentials.
#[derive(Clone, Deserialize)]
pub struct ServiceConfig {
    /// WebSocket URL of the streaming service.
    #[serde(default = "default_service_url")]
    pub url: String,

    /// Bearer credential for the handshake.
    #[serde(default)]
    pub api_key: String,

    /// Model selector appended to the URL.
    #[serde(default = "default_model")]
    pub model: String,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

/// Transcoder and chunking settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Path to the ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Hard timeout for one transcoder invocation, in seconds.
    #[serde(default = "default_transcode_timeout_secs")]
    pub transcode_timeout_secs: u64,

    /// Raw bytes per upload chunk before base64 expansion.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Parallel base64 encode workers.
    #[serde(default = "default_encode_workers")]
    pub encode_workers: usize,
}

/// Deadlines and the latency budget.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Overall deadline for one exchange against the service, in seconds.
    #[serde(default = "default_exchange_deadline_secs")]
    pub exchange_deadline_secs: u64,

    /// Latency budget for one exchange, in milliseconds.
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,

    /// When true, a completed exchange over budget is replaced by a
    /// fallback reply. When false the budget is report-only.
    #[serde(default)]
    pub enforce_budget: bool,

    /// Idle period after which a parked session is discarded, in seconds.
    #[serde(default = "default_session_idle_expiry_secs")]
    pub session_idle_expiry_secs: u64,
}

/// Fallback collaborator endpoints and credentials.
#[derive(Clone, Deserialize)]
pub struct FallbackConfig {
    /// Chat-completions style endpoint for the text fallback.
    #[serde(default = "default_completion_url")]
    pub completion_url: String,

    /// Model for the text fallback.
    #[serde(default = "default_completion_model")]
    pub completion_model: String,

    /// Credential for the text fallback. Empty reuses the service key.
    #[serde(default)]
    pub completion_api_key: String,

    /// Timeout for the text fallback call, in seconds.
    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,

    /// Base URL of the speech-synthesis service.
    #[serde(default = "default_synthesis_url")]
    pub synthesis_url: String,

    /// Voice id on the synthesis service. Empty disables synthesis.
    #[serde(default)]
    pub synthesis_voice: String,

    /// Credential for the synthesis service.
    #[serde(default)]
    pub synthesis_api_key: String,
}

impl fmt::Debug for FallbackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackConfig")
            .field("completion_url", &self.completion_url)
            .field("completion_model", &self.completion_model)
            .field("completion_api_key", &"[REDACTED]")
            .field("completion_timeout_secs", &self.completion_timeout_secs)
            .field("synthesis_url", &self.synthesis_url)
            .field("synthesis_voice", &self.synthesis_voice)
            .field("synthesis_api_key", &"[REDACTED]")
            .finish()
    }
}

/// Logging configuration.
///
/// Nothing in this workspace installs a `tracing` subscriber; the section
/// is loaded and env-overridable so the embedding binary can hand it to
/// whatever subscriber it sets up.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "voxlink_relay=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_service_url() -> String {
    "wss://api.openai.com/v1/realtime".to_string()
}

fn default_model() -> String {
    "gpt-4o-realtime-preview-2024-10-01".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_transcode_timeout_secs() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_encode_workers() -> usize {
    3
}

fn default_exchange_deadline_secs() -> u64 {
    10
}

fn default_budget_ms() -> u64 {
    800
}

fn default_session_idle_expiry_secs() -> u64 {
    300
}

fn default_completion_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_completion_timeout_secs() -> u64 {
    8
}

fn default_synthesis_url() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            api_key: String::new(),
            model: default_model(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            transcode_timeout_secs: default_transcode_timeout_secs(),
            chunk_size: default_chunk_size(),
            encode_workers: default_encode_workers(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            exchange_deadline_secs: default_exchange_deadline_secs(),
            budget_ms: default_budget_ms(),
            enforce_budget: false,
            session_idle_expiry_secs: default_session_idle_expiry_secs(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            completion_url: default_completion_url(),
            completion_model: default_completion_model(),
            completion_api_key: String::new(),
            completion_timeout_secs: default_completion_timeout_secs(),
            synthesis_url: default_synthesis_url(),
            synthesis_voice: String::new(),
            synthesis_api_key: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl TimingConfig {
    pub fn exchange_deadline(&self) -> Duration {
        Duration::from_secs(self.exchange_deadline_secs)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn session_idle_expiry(&self) -> Duration {
        Duration::from_secs(self.session_idle_expiry_secs)
    }
}

impl PipelineConfig {
    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }
}

impl FallbackConfig {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOXLINK_SERVICE_URL` overrides `service.url`
/// - `VOXLINK_API_KEY` overrides `service.api_key`
/// - `VOXLINK_MODEL` overrides `service.model`
/// - `VOXLINK_FFMPEG` overrides `pipeline.ffmpeg_path`
/// - `VOXLINK_BUDGET_MS` overrides `timing.budget_ms`
/// - `VOXLINK_ENFORCE_BUDGET` overrides `timing.enforce_budget`
/// - `VOXLINK_FALLBACK_API_KEY` overrides `fallback.completion_api_key`
/// - `VOXLINK_SYNTHESIS_API_KEY` overrides `fallback.synthesis_api_key`
/// - `VOXLINK_LOG_LEVEL` overrides `logging.level`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<RelayConfig, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                RelayConfig::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => RelayConfig::default(),
    };

    // Environment variable overrides
    if let Ok(url) = std::env::var("VOXLINK_SERVICE_URL") {
        config.service.url = url;
    }
    if let Ok(key) = std::env::var("VOXLINK_API_KEY") {
        config.service.api_key = key;
    }
    if let Ok(model) = std::env::var("VOXLINK_MODEL") {
        config.service.model = model;
    }
    if let Ok(ffmpeg) = std::env::var("VOXLINK_FFMPEG") {
        config.pipeline.ffmpeg_path = ffmpeg;
    }
    if let Ok(budget) = std::env::var("VOXLINK_BUDGET_MS") {
        if let Ok(parsed) = budget.parse() {
            config.timing.budget_ms = parsed;
        }
    }
    if let Ok(enforce) = std::env::var("VOXLINK_ENFORCE_BUDGET") {
        config.timing.enforce_budget = enforce == "true" || enforce == "1";
    }
    if let Ok(key) = std::env::var("VOXLINK_FALLBACK_API_KEY") {
        config.fallback.completion_api_key = key;
    }
    if let Ok(key) = std::env::var("VOXLINK_SYNTHESIS_API_KEY") {
        config.fallback.synthesis_api_key = key;
    }
    if let Ok(level) = std::env::var("VOXLINK_LOG_LEVEL") {
        config.logging.level = level;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_service_constants() {
        let config = RelayConfig::default();
        assert_eq!(config.pipeline.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.timing.budget_ms, 800);
        assert!(!config.timing.enforce_budget);
        assert_eq!(config.timing.exchange_deadline(), Duration::from_secs(10));
        assert_eq!(config.fallback.completion_timeout(), Duration::from_secs(8));
        assert_eq!(config.session.voice, "coral");
        assert_eq!(config.session.vad.silence_duration_ms, 500);
    }

    #[test]
    fn test_partial_toml_keeps_defaults_elsewhere() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[service]
url = "ws://127.0.0.1:7000/v1/stream"
api_key = "sk-local"

[timing]
budget_ms = 525
enforce_budget = true
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.service.url, "ws://127.0.0.1:7000/v1/stream");
        assert_eq!(config.timing.budget_ms, 525);
        assert!(config.timing.enforce_budget);
        // Untouched sections keep their defaults.
        assert_eq!(config.pipeline.ffmpeg_path, "ffmpeg");
        assert_eq!(config.fallback.completion_model, "gpt-4o-mini");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config(Some("/nonexistent/voxlink.toml")).unwrap();
        assert_eq!(config.timing.budget_ms, 800);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[service").unwrap();
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let config = RelayConfig {
            service: ServiceConfig {
                api_key: "sk-secret".to_string(),
                ..ServiceConfig::default()
            },
            ..RelayConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
