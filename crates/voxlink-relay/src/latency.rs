//! Per-exchange latency accounting.
//!
//! The governor records monotonic marks as the exchange progresses and
//! freezes them into a [`LatencyReport`] at the end. It is consulted only
//! after the exchange terminates; it never aborts in-flight work, so a
//! response that is already streaming is always allowed to finish.

use std::time::{Duration, Instant};
use voxlink_types::LatencyReport;

/// Records stage marks for one exchange.
#[derive(Debug)]
pub struct LatencyGovernor {
    started: Instant,
    last_mark: Instant,
    budget: Duration,
    ingress_transcode: Option<Duration>,
    upload: Option<Duration>,
    response_wait: Option<Duration>,
    egress_transcode: Option<Duration>,
}

impl LatencyGovernor {
    pub fn start(budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_mark: now,
            budget,
            ingress_transcode: None,
            upload: None,
            response_wait: None,
            egress_transcode: None,
        }
    }

    /// Duration since the previous mark, and advances the mark.
    fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.last_mark);
        self.last_mark = now;
        delta
    }

    pub fn mark_ingress_done(&mut self) {
        self.ingress_transcode = Some(self.lap());
    }

    pub fn mark_upload_done(&mut self) {
        self.upload = Some(self.lap());
    }

    pub fn mark_response_done(&mut self) {
        self.response_wait = Some(self.lap());
    }

    pub fn mark_egress_done(&mut self) {
        self.egress_transcode = Some(self.lap());
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Freezes the marks into a report. Total is the span from exchange
    /// start to the last observed mark.
    pub fn report(&self) -> LatencyReport {
        LatencyReport {
            ingress_transcode: self.ingress_transcode,
            upload: self.upload,
            response_wait: self.response_wait,
            egress_transcode: self.egress_transcode,
            total: self.last_mark.saturating_duration_since(self.started),
            budget: self.budget,
        }
    }
}
