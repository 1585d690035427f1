//! Terminal exchange outcomes: fallback decisions, latency reports and the
//! uniform reply handed back to the transport layer.

use crate::audio::AudioSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why an exchange escalated to the fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackKind {
    ConnectionError,
    Timeout,
    EmptyResponse,
    BudgetExceeded,
    MalformedEvent,
    TranscodeFailed,
}

impl fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            FallbackKind::ConnectionError => "connection-error",
            FallbackKind::Timeout => "timeout",
            FallbackKind::EmptyResponse => "empty-response",
            FallbackKind::BudgetExceeded => "budget-exceeded",
            FallbackKind::MalformedEvent => "malformed-event",
            FallbackKind::TranscodeFailed => "transcode-failed",
        };
        f.write_str(tag)
    }
}

/// A fallback decision: the tag plus a human-readable reason.
///
/// Produced at most once per exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackReason {
    pub kind: FallbackKind,
    pub detail: String,
}

impl FallbackReason {
    pub fn new(kind: FallbackKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Which path produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Realtime,
    Fallback,
}

/// Named stage durations for one exchange, frozen when it terminates.
///
/// Stages that never ran (a text-only exchange has no transcode stages)
/// stay `None`. The total is the span from exchange start to the last
/// observed mark and is never negative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyReport {
    pub ingress_transcode: Option<Duration>,
    pub upload: Option<Duration>,
    pub response_wait: Option<Duration>,
    pub egress_transcode: Option<Duration>,
    pub total: Duration,
    pub budget: Duration,
}

impl LatencyReport {
    /// Whether the exchange finished inside its configured budget.
    pub fn within_budget(&self) -> bool {
        self.total <= self.budget
    }

    /// Sum of the observed stage durations.
    pub fn stage_sum(&self) -> Duration {
        [
            self.ingress_transcode,
            self.upload,
            self.response_wait,
            self.egress_transcode,
        ]
        .into_iter()
        .flatten()
        .sum()
    }
}

/// Uniform result of processing one inbound message.
///
/// The text is always non-empty: every failure path funnels through the
/// fallback coordinator, which has a last-resort canned reply.
#[derive(Debug, Clone)]
pub struct RelayReply {
    /// Reply text. Never empty.
    pub text: String,
    /// Synthesized reply audio, when available.
    pub audio: Option<Vec<u8>>,
    /// Format of `audio`, when present.
    pub audio_spec: Option<AudioSpec>,
    /// Which path produced this reply.
    pub source: ReplySource,
    /// Set when the fallback path was taken.
    pub fallback: Option<FallbackReason>,
    /// Stage timings for the exchange.
    pub latency: LatencyReport,
}

impl RelayReply {
    pub fn audio_present(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| !a.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_kind_tags() {
        assert_eq!(FallbackKind::EmptyResponse.to_string(), "empty-response");
        let json = serde_json::to_string(&FallbackKind::BudgetExceeded).unwrap();
        assert_eq!(json, "\"budget-exceeded\"");
    }

    #[test]
    fn test_latency_report_budget_and_sum() {
        let report = LatencyReport {
            ingress_transcode: Some(Duration::from_millis(40)),
            upload: Some(Duration::from_millis(60)),
            response_wait: Some(Duration::from_millis(300)),
            egress_transcode: None,
            total: Duration::from_millis(400),
            budget: Duration::from_millis(800),
        };
        assert!(report.within_budget());
        assert_eq!(report.stage_sum(), Duration::from_millis(400));

        let over = LatencyReport {
            total: Duration::from_millis(801),
            budget: Duration::from_millis(800),
            ..Default::default()
        };
        assert!(!over.within_budget());
    }
}
