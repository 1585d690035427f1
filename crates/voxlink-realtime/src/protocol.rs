//! JSON-framed wire events exchanged with the streaming service.
//!
//! Outbound events serialize through [`ClientEvent`]; inbound frames are
//! parsed by [`ServerEvent::parse`], which keeps unknown kinds as
//! [`ServerEvent::Unknown`] so the state machine can log and ignore them
//! (forward-compatibility default).

use crate::error::SessionError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use voxlink_types::{SessionSettings, VadSettings};

/// Session configuration as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurePayload {
    pub modalities: Vec<String>,
    pub voice: String,
    pub input_format: String,
    pub output_format: String,
    pub vad: VadSettings,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl From<&SessionSettings> for ConfigurePayload {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            modalities: settings.modalities.clone(),
            voice: settings.voice.clone(),
            input_format: settings.input_format.descriptor(),
            output_format: settings.output_format.descriptor(),
            vad: settings.vad,
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

/// Outbound event kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Pushes the session configuration after the handshake.
    #[serde(rename = "session.configure")]
    Configure { session: ConfigurePayload },

    /// Appends one base64 chunk to the input audio buffer. Chunks carry no
    /// numbering; append order is the ordering contract.
    #[serde(rename = "input.append")]
    InputAppend { payload: String },

    /// Seals the input audio buffer.
    #[serde(rename = "input.commit")]
    InputCommit,

    /// Requests a response for the committed input.
    #[serde(rename = "response.request")]
    ResponseRequest,

    /// Injects a conversation item without audio.
    #[serde(rename = "conversation.inject")]
    ConversationInject { role: String, text: String },
}

/// Inbound event kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionCreated,
    SessionUpdated,
    InputCommitted,
    ResponseCreated,
    /// Incremental text fragment.
    TextDelta(String),
    /// Incremental audio fragment, already base64-decoded.
    AudioDelta(Vec<u8>),
    ResponseDone,
    /// Error reported by the service; carries its message.
    ServiceError(String),
    /// Any kind this client does not know. Logged and ignored upstream.
    Unknown(String),
}

impl ServerEvent {
    /// Parses one inbound JSON frame.
    ///
    /// Fails only when the frame is not valid JSON, has no `type` field,
    /// or a known kind carries an undecodable payload.
    pub fn parse(raw: &str) -> Result<ServerEvent, SessionError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| SessionError::Decode(e.to_string()))?;
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| SessionError::Decode("event has no type field".to_string()))?;

        let event = match kind {
            "session.created" => ServerEvent::SessionCreated,
            "session.updated" => ServerEvent::SessionUpdated,
            "input.committed" => ServerEvent::InputCommitted,
            "response.created" => ServerEvent::ResponseCreated,
            "response.text.delta" => {
                let delta = value.get("delta").and_then(|d| d.as_str()).unwrap_or("");
                ServerEvent::TextDelta(delta.to_string())
            }
            "response.audio.delta" => {
                let delta = value.get("delta").and_then(|d| d.as_str()).unwrap_or("");
                let bytes = BASE64
                    .decode(delta)
                    .map_err(|e| SessionError::Decode(format!("bad audio delta: {e}")))?;
                ServerEvent::AudioDelta(bytes)
            }
            "response.done" => ServerEvent::ResponseDone,
            "error" => {
                let message = value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown service error");
                ServerEvent::ServiceError(message.to_string())
            }
            other => ServerEvent::Unknown(other.to_string()),
        };
        Ok(event)
    }

    /// The wire name for this event kind, for logging.
    pub fn kind(&self) -> &str {
        match self {
            ServerEvent::SessionCreated => "session.created",
            ServerEvent::SessionUpdated => "session.updated",
            ServerEvent::InputCommitted => "input.committed",
            ServerEvent::ResponseCreated => "response.created",
            ServerEvent::TextDelta(_) => "response.text.delta",
            ServerEvent::AudioDelta(_) => "response.audio.delta",
            ServerEvent::ResponseDone => "response.done",
            ServerEvent::ServiceError(_) => "error",
            ServerEvent::Unknown(kind) => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxlink_types::SessionSettings;

    #[test]
    fn test_client_events_serialize_with_type_tag() {
        let json = serde_json::to_value(&ClientEvent::InputCommit).unwrap();
        assert_eq!(json["type"], "input.commit");

        let json = serde_json::to_value(&ClientEvent::InputAppend {
            payload: "QUJD".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "input.append");
        assert_eq!(json["payload"], "QUJD");
    }

    #[test]
    fn test_configure_carries_format_descriptors() {
        let settings = SessionSettings::default();
        let event = ClientEvent::Configure {
            session: ConfigurePayload::from(&settings),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session.configure");
        assert_eq!(json["session"]["input_format"], "pcm_s16le_16000");
        assert_eq!(json["session"]["output_format"], "pcm_s16le_24000");
        assert_eq!(json["session"]["vad"]["prefix_padding_ms"], 300);
    }

    #[test]
    fn test_parse_known_events() {
        let event = ServerEvent::parse(r#"{"type":"response.text.delta","delta":"olá"}"#).unwrap();
        assert_eq!(event, ServerEvent::TextDelta("olá".to_string()));

        let event = ServerEvent::parse(r#"{"type":"response.audio.delta","delta":"AQID"}"#).unwrap();
        assert_eq!(event, ServerEvent::AudioDelta(vec![1, 2, 3]));

        let event = ServerEvent::parse(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert_eq!(event, ServerEvent::ServiceError("boom".to_string()));

        let event = ServerEvent::parse(r#"{"type":"response.done"}"#).unwrap();
        assert_eq!(event, ServerEvent::ResponseDone);
    }

    #[test]
    fn test_parse_unknown_kind_is_preserved() {
        let event = ServerEvent::parse(r#"{"type":"rate_limits.updated"}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown("rate_limits.updated".to_string()));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ServerEvent::parse("not json").is_err());
        assert!(ServerEvent::parse(r#"{"no_type":true}"#).is_err());
        assert!(ServerEvent::parse(r#"{"type":"response.audio.delta","delta":"!!"}"#).is_err());
    }
}
