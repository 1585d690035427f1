//! Outbound audio pipeline: reassemble deltas and transcode for delivery.

use crate::latency::LatencyGovernor;
use tracing::debug;
use voxlink_audio::{join_fragments, Transcoder, TranscodeError};
use voxlink_types::AudioSpec;

/// Converts accumulated audio deltas into the delivery format.
pub struct EgressPipeline {
    transcoder: Transcoder,
    delivery: AudioSpec,
}

impl EgressPipeline {
    pub fn new(transcoder: Transcoder) -> Self {
        Self {
            transcoder,
            delivery: AudioSpec::delivery(),
        }
    }

    pub fn delivery_spec(&self) -> AudioSpec {
        self.delivery
    }

    /// Joins `fragments` (receipt order) and transcodes from the session's
    /// canonical output format to the delivery codec.
    pub async fn run(
        &self,
        fragments: &[Vec<u8>],
        output_spec: &AudioSpec,
        governor: &mut LatencyGovernor,
    ) -> Result<Vec<u8>, TranscodeError> {
        let joined = join_fragments(fragments);
        debug!(
            fragments = fragments.len(),
            bytes = joined.len(),
            "reassembled response audio"
        );
        let delivered = self
            .transcoder
            .transcode(&joined, output_spec, &self.delivery)
            .await?;
        governor.mark_egress_done();
        Ok(delivered)
    }
}
