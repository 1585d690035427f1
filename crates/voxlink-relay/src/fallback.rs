//! Degraded-mode reply production.
//!
//! Invoked when the realtime path fails for any reason: connect failure,
//! protocol error, deadline expiry, empty response or budget rejection.
//! The coordinator guarantees a non-empty text reply in bounded time; the
//! text collaborator gets one chance inside its timeout, then a canned
//! last-resort reply is used. Speech synthesis afterwards is best effort
//! and its failure never fails the exchange.

use crate::collaborators::{SpeechSynthesis, TextCompletion};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use voxlink_types::{AudioCodec, AudioSpec, FallbackReason};

/// Reply used when even the text collaborator fails.
pub const LAST_RESORT_REPLY: &str =
    "Desculpe, houve um problema técnico. Pode repetir por favor?";

/// What the fallback path produced.
#[derive(Debug)]
pub struct FallbackOutcome {
    /// Non-empty reply text.
    pub text: String,
    /// Synthesized audio, when the synthesis collaborator succeeded.
    pub audio: Option<Vec<u8>>,
    /// Format of `audio`, when present.
    pub audio_spec: Option<AudioSpec>,
}

/// Produces degraded replies through the collaborator ports.
pub struct FallbackCoordinator {
    completion: Arc<dyn TextCompletion>,
    synthesis: Option<Arc<dyn SpeechSynthesis>>,
    completion_timeout: Duration,
}

impl FallbackCoordinator {
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        synthesis: Option<Arc<dyn SpeechSynthesis>>,
        completion_timeout: Duration,
    ) -> Self {
        Self {
            completion,
            synthesis,
            completion_timeout,
        }
    }

    /// Produces a reply for a failed exchange.
    ///
    /// `prompt` is the best available rendering of what the user said; for
    /// audio messages whose transcription never arrived it may be empty,
    /// in which case the collaborator is skipped and the canned reply is
    /// returned directly.
    pub async fn recover(&self, reason: &FallbackReason, prompt: &str) -> FallbackOutcome {
        info!(kind = %reason.kind, detail = %reason.detail, "escalating to fallback");

        let text = if prompt.trim().is_empty() {
            LAST_RESORT_REPLY.to_string()
        } else {
            match tokio::time::timeout(self.completion_timeout, self.completion.complete(prompt))
                .await
            {
                Ok(Ok(text)) if !text.trim().is_empty() => text,
                Ok(Ok(_)) => {
                    warn!("fallback completion returned empty text, using canned reply");
                    LAST_RESORT_REPLY.to_string()
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "fallback completion failed, using canned reply");
                    LAST_RESORT_REPLY.to_string()
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.completion_timeout.as_millis() as u64,
                        "fallback completion timed out, using canned reply"
                    );
                    LAST_RESORT_REPLY.to_string()
                }
            }
        };

        let (audio, audio_spec) = match &self.synthesis {
            Some(synthesis) => {
                match tokio::time::timeout(self.completion_timeout, synthesis.synthesize(&text))
                    .await
                {
                    Ok(Ok(bytes)) if !bytes.is_empty() => (
                        Some(bytes),
                        Some(AudioSpec::new(AudioCodec::Mp3, 44_100, 1)),
                    ),
                    Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {
                        // Best effort only; the text reply stands alone.
                        warn!("fallback synthesis unavailable, replying with text only");
                        (None, None)
                    }
                }
            }
            None => (None, None),
        };

        FallbackOutcome {
            text,
            audio,
            audio_spec,
        }
    }
}
