//! Exchange orchestration.
//!
//! One facade method per inbound message kind. Every failure on the
//! realtime path funnels into the fallback coordinator, so callers always
//! receive a reply with non-empty text; the only error that propagates is
//! [`RelayError::Busy`], which signals a caller-side sequencing problem.

use crate::collaborators::{HttpCompletion, HttpSynthesis, SpeechSynthesis, TextCompletion};
use crate::config::RelayConfig;
use crate::egress::EgressPipeline;
use crate::error::RelayError;
use crate::fallback::FallbackCoordinator;
use crate::ingress::{source_spec, IngressPipeline};
use crate::latency::LatencyGovernor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use voxlink_audio::Transcoder;
use voxlink_realtime::{
    drive, ClientEvent, ServiceEndpoint, SessionClient, SessionError, SessionRegistry,
};
use voxlink_types::{
    AudioCodec, FallbackKind, FallbackReason, LatencyReport, RelayReply, ReplySource,
    SessionSettings,
};

/// Reply text used when the service answers with audio only.
const AUDIO_ONLY_PLACEHOLDER: &str = "[resposta em áudio]";

/// Orchestrates exchanges between inbound messages and the streaming
/// service, with a fallback path for every failure mode.
pub struct Relay {
    endpoint: ServiceEndpoint,
    settings: SessionSettings,
    registry: SessionRegistry,
    ingress: IngressPipeline,
    egress: EgressPipeline,
    fallback: FallbackCoordinator,
    exchange_deadline: Duration,
    budget: Duration,
    enforce_budget: bool,
}

impl Relay {
    /// Builds a relay with explicit collaborators. Tests use this with
    /// doubles; production code goes through [`Relay::from_config`].
    pub fn new(
        config: &RelayConfig,
        completion: Arc<dyn TextCompletion>,
        synthesis: Option<Arc<dyn SpeechSynthesis>>,
    ) -> Self {
        let transcoder = Transcoder::new(config.pipeline.ffmpeg_path.clone())
            .with_timeout(config.pipeline.transcode_timeout());
        Self {
            endpoint: ServiceEndpoint {
                url: config.service.url.clone(),
                api_key: config.service.api_key.clone(),
                model: config.service.model.clone(),
            },
            settings: config.session.clone(),
            registry: SessionRegistry::new(config.timing.session_idle_expiry()),
            ingress: IngressPipeline::new(
                transcoder.clone(),
                config.pipeline.chunk_size,
                config.pipeline.encode_workers,
            ),
            egress: EgressPipeline::new(transcoder),
            fallback: FallbackCoordinator::new(
                completion,
                synthesis,
                config.fallback.completion_timeout(),
            ),
            exchange_deadline: config.timing.exchange_deadline(),
            budget: config.timing.budget(),
            enforce_budget: config.timing.enforce_budget,
        }
    }

    /// Builds a relay with HTTP-backed collaborators from the config.
    pub fn from_config(config: &RelayConfig) -> Self {
        let completion_key = if config.fallback.completion_api_key.is_empty() {
            config.service.api_key.clone()
        } else {
            config.fallback.completion_api_key.clone()
        };
        let completion: Arc<dyn TextCompletion> = Arc::new(HttpCompletion::new(
            config.fallback.completion_url.clone(),
            completion_key,
            config.fallback.completion_model.clone(),
        ));
        let synthesis: Option<Arc<dyn SpeechSynthesis>> = if config.fallback.synthesis_voice.is_empty()
            || config.fallback.synthesis_api_key.is_empty()
        {
            None
        } else {
            Some(Arc::new(HttpSynthesis::new(
                config.fallback.synthesis_url.clone(),
                config.fallback.synthesis_api_key.clone(),
                config.fallback.synthesis_voice.clone(),
            )))
        };
        Self::new(config, completion, synthesis)
    }

    /// Processes one inbound audio message and produces a reply.
    ///
    /// Always returns a reply with non-empty text; the only error is
    /// [`RelayError::Busy`] when `sender` already has an exchange in
    /// flight.
    pub async fn process_audio_message(
        &self,
        audio: &[u8],
        codec: AudioCodec,
        sender: &str,
    ) -> Result<RelayReply, RelayError> {
        let mut governor = LatencyGovernor::start(self.budget);
        let outbound = Outbound::Audio { audio, codec };
        match self.realtime_exchange(sender, outbound, &mut governor).await {
            Ok(reply) => match budget_violation(&reply.latency, self.enforce_budget) {
                Some(reason) => Ok(self.degrade(reason, "", &governor).await),
                None => Ok(reply),
            },
            Err(RelayError::Busy(key)) => Err(RelayError::Busy(key)),
            Err(e) => {
                // No transcript exists for a failed audio exchange, so the
                // coordinator goes straight to its canned reply.
                Ok(self.degrade(reason_for(&e), "", &governor).await)
            }
        }
    }

    /// Processes one inbound text message and produces a text reply.
    pub async fn process_text_message(
        &self,
        text: &str,
        sender: &str,
    ) -> Result<RelayReply, RelayError> {
        let mut governor = LatencyGovernor::start(self.budget);
        match self.realtime_exchange(sender, Outbound::Text(text), &mut governor).await {
            Ok(reply) => match budget_violation(&reply.latency, self.enforce_budget) {
                Some(reason) => Ok(self.degrade(reason, text, &governor).await),
                None => Ok(reply),
            },
            Err(RelayError::Busy(key)) => Err(RelayError::Busy(key)),
            Err(e) => Ok(self.degrade(reason_for(&e), text, &governor).await),
        }
    }

    /// Sweeps expired idle sessions. Callers run this periodically.
    pub async fn purge_idle_sessions(&self) {
        self.registry.purge_expired().await;
    }

    /// Runs one exchange, reusing the counterparty's parked session when
    /// one exists.
    ///
    /// A reused session may have died while parked; if the exchange fails
    /// with a connection-type error on a reused (not fresh) session, one
    /// reconnect is attempted before giving up. Protocol and deadline
    /// failures are never retried.
    async fn realtime_exchange(
        &self,
        sender: &str,
        outbound: Outbound<'_>,
        governor: &mut LatencyGovernor,
    ) -> Result<RelayReply, RelayError> {
        let (mut client, mut reused) = self.checkout_or_connect(sender).await?;
        loop {
            let result = match outbound {
                Outbound::Audio { audio, codec } => {
                    self.audio_exchange(&mut client, audio, codec, governor).await
                }
                Outbound::Text(text) => self.text_exchange(&mut client, text, governor).await,
            };
            match result {
                Ok(reply) => {
                    self.registry.check_in(sender, client).await;
                    return Ok(reply);
                }
                Err(e) => {
                    client.close().await;
                    if reused && stale_session_failure(&e) {
                        reused = false;
                        warn!(sender, error = %e, "parked session was stale, reconnecting once");
                        match SessionClient::connect(
                            &self.endpoint,
                            self.settings.clone(),
                            self.exchange_deadline,
                        )
                        .await
                        {
                            Ok(fresh) => {
                                client = fresh;
                                continue;
                            }
                            Err(e2) => {
                                self.registry.release(sender).await;
                                return Err(e2.into());
                            }
                        }
                    }
                    self.registry.release(sender).await;
                    return Err(e);
                }
            }
        }
    }

    /// Reuses the counterparty's parked session or connects a new one.
    /// The flag reports whether the session was reused.
    async fn checkout_or_connect(&self, sender: &str) -> Result<(SessionClient, bool), RelayError> {
        match self.registry.check_out(sender).await {
            Ok(Some(client)) => Ok((client, true)),
            Ok(None) => {
                match SessionClient::connect(
                    &self.endpoint,
                    self.settings.clone(),
                    self.exchange_deadline,
                )
                .await
                {
                    Ok(client) => {
                        info!(sender, session = %client.id(), "new session established");
                        Ok((client, false))
                    }
                    Err(e) => {
                        self.registry.release(sender).await;
                        Err(e.into())
                    }
                }
            }
            Err(SessionError::Busy(key)) => Err(RelayError::Busy(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn audio_exchange(
        &self,
        client: &mut SessionClient,
        audio: &[u8],
        codec: AudioCodec,
        governor: &mut LatencyGovernor,
    ) -> Result<RelayReply, RelayError> {
        let spec = source_spec(codec);
        let stats = self.ingress.run(client, audio, &spec, governor).await?;

        let remaining = self.exchange_deadline.saturating_sub(governor.elapsed());
        let accumulator = drive(client, remaining).await?;
        governor.mark_response_done();

        if !accumulator.has_text() && !accumulator.has_audio() {
            return Err(RelayError::EmptyResponse);
        }
        debug!(
            session = %client.id(),
            chunks_sent = stats.chunks_sent,
            canonical_bytes = stats.canonical_bytes,
            "response accumulated"
        );

        let text = accumulator.text();
        let has_text = accumulator.has_text();
        let output_format = client.settings().output_format;
        let fragments = accumulator.into_audio_fragments();
        let mut audio_spec = None;
        let audio_out = if fragments.iter().any(|f| !f.is_empty()) {
            match self.egress.run(&fragments, &output_format, governor).await {
                Ok(bytes) => {
                    audio_spec = Some(self.egress.delivery_spec());
                    Some(bytes)
                }
                // With text in hand a broken egress degrades to text-only
                // delivery instead of discarding the whole response.
                Err(e) if has_text => {
                    warn!(error = %e, "egress transcode failed, delivering text only");
                    None
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        let text = if text.is_empty() {
            AUDIO_ONLY_PLACEHOLDER.to_string()
        } else {
            text
        };
        Ok(RelayReply {
            text,
            audio: audio_out,
            audio_spec,
            source: ReplySource::Realtime,
            fallback: None,
            latency: governor.report(),
        })
    }

    async fn text_exchange(
        &self,
        client: &mut SessionClient,
        text: &str,
        governor: &mut LatencyGovernor,
    ) -> Result<RelayReply, RelayError> {
        client
            .send(&ClientEvent::ConversationInject {
                role: "user".to_string(),
                text: text.to_string(),
            })
            .await?;
        client.send(&ClientEvent::ResponseRequest).await?;
        governor.mark_upload_done();

        let remaining = self.exchange_deadline.saturating_sub(governor.elapsed());
        let accumulator = drive(client, remaining).await?;
        governor.mark_response_done();

        // Text exchanges deliver text; audio deltas, if any, are dropped.
        if !accumulator.has_text() {
            return Err(RelayError::EmptyResponse);
        }
        Ok(RelayReply {
            text: accumulator.text(),
            audio: None,
            audio_spec: None,
            source: ReplySource::Realtime,
            fallback: None,
            latency: governor.report(),
        })
    }

    async fn degrade(
        &self,
        reason: FallbackReason,
        prompt: &str,
        governor: &LatencyGovernor,
    ) -> RelayReply {
        let outcome = self.fallback.recover(&reason, prompt).await;
        RelayReply {
            text: outcome.text,
            audio: outcome.audio,
            audio_spec: outcome.audio_spec,
            source: ReplySource::Fallback,
            fallback: Some(reason),
            latency: governor.report(),
        }
    }
}

/// One inbound message, ready for upload.
#[derive(Clone, Copy)]
enum Outbound<'a> {
    Audio { audio: &'a [u8], codec: AudioCodec },
    Text(&'a str),
}

/// Failure signatures of a session that died while parked: the transport
/// is gone or the remote side closed. Only these justify a reconnect;
/// deadline and protocol failures would just fail again.
fn stale_session_failure(error: &RelayError) -> bool {
    matches!(
        error,
        RelayError::Session(
            SessionError::Connection(_) | SessionError::Closed | SessionError::NotReady(_)
        )
    )
}

/// Maps an exchange error to its fallback tag.
fn reason_for(error: &RelayError) -> FallbackReason {
    let kind = match error {
        RelayError::Session(SessionError::Timeout) => FallbackKind::Timeout,
        RelayError::Session(SessionError::MalformedEvent(_) | SessionError::Decode(_)) => {
            FallbackKind::MalformedEvent
        }
        RelayError::Session(_) | RelayError::Busy(_) => FallbackKind::ConnectionError,
        RelayError::Transcode(_) | RelayError::Encode(_) => FallbackKind::TranscodeFailed,
        RelayError::EmptyResponse => FallbackKind::EmptyResponse,
    };
    FallbackReason::new(kind, error.to_string())
}

/// Post-completion budget policy: a finished exchange over budget is
/// replaced only when enforcement is enabled; in-flight work is never
/// aborted either way.
fn budget_violation(report: &LatencyReport, enforce: bool) -> Option<FallbackReason> {
    if enforce && !report.within_budget() {
        Some(FallbackReason::new(
            FallbackKind::BudgetExceeded,
            format!(
                "exchange took {}ms against a {}ms budget",
                report.total.as_millis(),
                report.budget.as_millis()
            ),
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxlink_audio::TranscodeError;

    fn report(total_ms: u64, budget_ms: u64) -> LatencyReport {
        LatencyReport {
            total: Duration::from_millis(total_ms),
            budget: Duration::from_millis(budget_ms),
            ..Default::default()
        }
    }

    #[test]
    fn test_budget_overrun_rejected_only_when_enforced() {
        let over = report(600, 500);
        assert!(budget_violation(&over, false).is_none());
        let reason = budget_violation(&over, true).unwrap();
        assert_eq!(reason.kind, FallbackKind::BudgetExceeded);
        assert!(reason.detail.contains("600"));
    }

    #[test]
    fn test_within_budget_never_rejected() {
        let under = report(400, 500);
        assert!(budget_violation(&under, true).is_none());
        assert!(budget_violation(&under, false).is_none());
    }

    #[test]
    fn test_only_connection_failures_justify_reconnect() {
        assert!(stale_session_failure(&RelayError::Session(
            SessionError::Closed
        )));
        assert!(!stale_session_failure(&RelayError::Session(
            SessionError::Timeout
        )));
        assert!(!stale_session_failure(&RelayError::Session(
            SessionError::MalformedEvent("delta before start".into())
        )));
        assert!(!stale_session_failure(&RelayError::EmptyResponse));
    }

    #[test]
    fn test_error_to_fallback_tag_mapping() {
        let timeout = RelayError::Session(SessionError::Timeout);
        assert_eq!(reason_for(&timeout).kind, FallbackKind::Timeout);

        let malformed =
            RelayError::Session(SessionError::MalformedEvent("delta before start".into()));
        assert_eq!(reason_for(&malformed).kind, FallbackKind::MalformedEvent);

        let closed = RelayError::Session(SessionError::Closed);
        assert_eq!(reason_for(&closed).kind, FallbackKind::ConnectionError);

        let transcode = RelayError::Transcode(TranscodeError::ProcessFailed {
            status: 1,
            stderr: "bad input".into(),
        });
        assert_eq!(reason_for(&transcode).kind, FallbackKind::TranscodeFailed);

        let empty = RelayError::EmptyResponse;
        assert_eq!(reason_for(&empty).kind, FallbackKind::EmptyResponse);
    }
}
