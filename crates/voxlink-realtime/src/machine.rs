//! Inbound event state machine for one exchange.
//!
//! Phases: `AwaitingAck → AwaitingResponseStart → Accumulating → Complete`,
//! with `Errored` absorbing from any phase. The machine only reports what
//! protocol events occurred; delivery policy (e.g. treating an empty
//! response as a failure) belongs to the caller.
//!
//! Unknown event kinds are logged and ignored for forward compatibility,
//! but malformed *ordering* of known events — a delta before the response
//! started — is a hard error: the remote side's ordering is itself a
//! contract this machine enforces.

use crate::client::SessionClient;
use crate::error::SessionError;
use crate::protocol::ServerEvent;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Where one exchange stands in the response protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    /// Waiting for the input buffer commit acknowledgment.
    AwaitingAck,
    /// Commit acknowledged; waiting for the response to start.
    AwaitingResponseStart,
    /// Response started; deltas are being accumulated.
    Accumulating,
    /// Terminal: the response finished.
    Complete,
    /// Terminal: a protocol error absorbed the exchange.
    Errored,
}

/// Ordered deltas received for one exchange.
///
/// Owned by exactly one state machine run; read-only once the machine
/// reaches a terminal phase and hands it back.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: Vec<String>,
    audio: Vec<Vec<u8>>,
    completed: bool,
}

impl ResponseAccumulator {
    /// Concatenated text fragments in receipt order.
    pub fn text(&self) -> String {
        self.text.concat()
    }

    /// Audio fragments in receipt order, not yet joined.
    pub fn audio_fragments(&self) -> &[Vec<u8>] {
        &self.audio
    }

    pub fn into_audio_fragments(self) -> Vec<Vec<u8>> {
        self.audio
    }

    pub fn has_audio(&self) -> bool {
        self.audio.iter().any(|f| !f.is_empty())
    }

    pub fn has_text(&self) -> bool {
        self.text.iter().any(|t| !t.is_empty())
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }
}

/// Drives phase transitions from inbound events and accumulates deltas.
#[derive(Debug, Default)]
pub struct EventStateMachine {
    phase: Option<ExchangePhase>,
    accumulator: ResponseAccumulator,
}

impl EventStateMachine {
    pub fn new() -> Self {
        Self {
            phase: Some(ExchangePhase::AwaitingAck),
            accumulator: ResponseAccumulator::default(),
        }
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase.unwrap_or(ExchangePhase::AwaitingAck)
    }

    /// Applies one inbound event.
    ///
    /// Returns the phase after the transition, or the error that moved the
    /// machine into `Errored`.
    pub fn observe(&mut self, event: ServerEvent) -> Result<ExchangePhase, SessionError> {
        let phase = self.phase();
        let next = match event {
            ServerEvent::InputCommitted => {
                // Informational; never blocks progress if already past it.
                if phase == ExchangePhase::AwaitingAck {
                    ExchangePhase::AwaitingResponseStart
                } else {
                    phase
                }
            }
            ServerEvent::ResponseCreated => match phase {
                ExchangePhase::AwaitingAck | ExchangePhase::AwaitingResponseStart => {
                    ExchangePhase::Accumulating
                }
                other => {
                    debug!("duplicate response start ignored in {other:?}");
                    other
                }
            },
            ServerEvent::TextDelta(delta) => {
                self.require_accumulating(phase, "response.text.delta")?;
                self.accumulator.text.push(delta);
                ExchangePhase::Accumulating
            }
            ServerEvent::AudioDelta(delta) => {
                self.require_accumulating(phase, "response.audio.delta")?;
                self.accumulator.audio.push(delta);
                ExchangePhase::Accumulating
            }
            ServerEvent::ResponseDone => {
                self.accumulator.completed = true;
                ExchangePhase::Complete
            }
            ServerEvent::ServiceError(message) => {
                self.phase = Some(ExchangePhase::Errored);
                return Err(SessionError::Remote(message));
            }
            ServerEvent::SessionCreated | ServerEvent::SessionUpdated => {
                debug!(kind = event.kind(), "session event during exchange ignored");
                phase
            }
            ServerEvent::Unknown(kind) => {
                // Forward-compatibility default: log and ignore.
                debug!(kind = %kind, "ignoring unknown event kind");
                phase
            }
        };
        self.phase = Some(next);
        Ok(next)
    }

    /// A delta before `response.created` is a protocol-ordering violation,
    /// always logged with the offending event.
    fn require_accumulating(
        &mut self,
        phase: ExchangePhase,
        kind: &str,
    ) -> Result<(), SessionError> {
        if phase == ExchangePhase::Accumulating {
            return Ok(());
        }
        warn!(kind, ?phase, "delta received before response started");
        self.phase = Some(ExchangePhase::Errored);
        Err(SessionError::MalformedEvent(format!(
            "{kind} received in {phase:?} before response started"
        )))
    }

    /// Hands back the accumulated response. Meaningful once a terminal
    /// phase was reached.
    pub fn into_accumulator(self) -> ResponseAccumulator {
        self.accumulator
    }
}

/// Consumes the session's inbound event stream until the exchange reaches
/// a terminal state or `deadline` expires.
///
/// On deadline expiry the pending socket read is cancelled (not merely
/// abandoned) and the session is marked unusable by the client.
pub async fn drive(
    client: &mut SessionClient,
    deadline: Duration,
) -> Result<ResponseAccumulator, SessionError> {
    let started = Instant::now();
    let mut machine = EventStateMachine::new();

    loop {
        let remaining = deadline.saturating_sub(started.elapsed());
        let event = client.next_event(remaining).await?;
        match machine.observe(event)? {
            ExchangePhase::Complete => {
                debug!(
                    session = %client.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "exchange complete"
                );
                return Ok(machine.into_accumulator());
            }
            ExchangePhase::Errored => unreachable!("observe returns Err on Errored"),
            _ => continue,
        }
    }
}
