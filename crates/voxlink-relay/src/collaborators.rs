//! Fallback collaborator ports and their HTTP-backed implementations.
//!
//! The coordinator talks to collaborators through traits so tests can
//! substitute doubles; the production implementations are thin reqwest
//! clients over a chat-completions endpoint and a text-to-speech endpoint.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response carried no usable content")]
    EmptyContent,
}

/// Produces a text reply when the realtime path is unavailable.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Renders reply text as audio, best effort.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CollaboratorError>;
}

/// Chat-completions backed [`TextCompletion`].
pub struct HttpCompletion {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl HttpCompletion {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextCompletion for HttpCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": 300,
        });
        debug!(url = %self.url, model = %self.model, "requesting fallback completion");

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = response.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(CollaboratorError::EmptyContent)?;
        Ok(content.to_string())
    }
}

/// Text-to-speech backed [`SpeechSynthesis`]. Returns MP3 bytes.
pub struct HttpSynthesis {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    voice_id: String,
}

impl HttpSynthesis {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesis for HttpSynthesis {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CollaboratorError> {
        let url = format!("{}/text-to-speech/{}", self.base_url, self.voice_id);
        let body = json!({
            "text": text,
            "model_id": "eleven_multilingual_v2",
            "voice_settings": {
                "stability": 0.6,
                "similarity_boost": 0.8,
                "style": 0.2,
                "use_speaker_boost": true,
            }
        });
        debug!(url = %url, chars = text.len(), "requesting fallback synthesis");

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(CollaboratorError::EmptyContent);
        }
        Ok(bytes.to_vec())
    }
}
