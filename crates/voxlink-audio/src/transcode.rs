use crate::error::TranscodeError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use voxlink_types::{AudioCodec, AudioSpec};

/// Maximum audio input size (25 MiB). Prevents resource exhaustion from
/// oversized inbound media.
const MAX_TRANSCODE_INPUT_BYTES: usize = 25 * 1024 * 1024;

/// Hard timeout for one transcoder invocation.
const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Invokes an external `ffmpeg` process to convert between audio formats.
///
/// Pure at the interface: bytes in, bytes in the target format out, or a
/// single [`TranscodeError`]. Temporary files are scoped to one call and
/// removed on every exit path, including timeout and cancellation (the
/// child is spawned with `kill_on_drop`, and the temp file handles delete
/// on drop).
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout: TRANSCODE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Converts `input` from `input_spec` to `output_spec`.
    ///
    /// No retries: a failure here is reported upward as a single failure
    /// event and the caller decides on fallback.
    pub async fn transcode(
        &self,
        input: &[u8],
        input_spec: &AudioSpec,
        output_spec: &AudioSpec,
    ) -> Result<Vec<u8>, TranscodeError> {
        if input.len() > MAX_TRANSCODE_INPUT_BYTES {
            return Err(TranscodeError::InputTooLarge {
                len: input.len(),
                limit: MAX_TRANSCODE_INPUT_BYTES,
            });
        }

        let input_file = tempfile::Builder::new()
            .prefix("voxlink-in-")
            .suffix(&format!(".{}", input_spec.codec.extension()))
            .tempfile()?;
        let output_file = tempfile::Builder::new()
            .prefix("voxlink-out-")
            .suffix(&format!(".{}", output_spec.codec.extension()))
            .tempfile()?;

        tokio::fs::write(input_file.path(), input).await?;

        let args = build_args(input_file.path(), input_spec, output_file.path(), output_spec);
        debug!(
            input = %input_spec,
            output = %output_spec,
            bytes = input.len(),
            "invoking transcoder"
        );

        let child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TranscodeError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TranscodeError::ProcessFailed {
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let converted = tokio::fs::read(output_file.path()).await?;
        debug!(
            in_bytes = input.len(),
            out_bytes = converted.len(),
            "transcode complete"
        );
        Ok(converted)
    }
}

/// Maps format descriptors to ffmpeg argument pairs.
///
/// Raw PCM carries no container metadata, so its parameters must be stated
/// explicitly on the input side; self-describing containers (OGG, MP3) are
/// probed by ffmpeg.
fn build_args(
    input_path: &Path,
    input_spec: &AudioSpec,
    output_path: &Path,
    output_spec: &AudioSpec,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    if input_spec.codec == AudioCodec::Pcm16 {
        args.extend(["-f", "s16le"].map(OsString::from));
        args.push("-ar".into());
        args.push(input_spec.sample_rate.to_string().into());
        args.push("-ac".into());
        args.push(input_spec.channels.to_string().into());
    }
    args.push("-i".into());
    args.push(input_path.into());

    match output_spec.codec {
        AudioCodec::Pcm16 => {
            args.extend(["-f", "s16le", "-acodec", "pcm_s16le"].map(OsString::from));
        }
        AudioCodec::OggOpus => {
            // VoIP profile at 64 kbit/s, the encoding the delivery channel
            // accepts for voice notes.
            args.extend(
                [
                    "-c:a",
                    "libopus",
                    "-b:a",
                    "64k",
                    "-application",
                    "voip",
                    "-frame_duration",
                    "20",
                ]
                .map(OsString::from),
            );
        }
        AudioCodec::Mp3 => {
            args.extend(["-c:a", "libmp3lame"].map(OsString::from));
        }
    }
    args.push("-ar".into());
    args.push(output_spec.sample_rate.to_string().into());
    args.push("-ac".into());
    args.push(output_spec.channels.to_string().into());

    args.push("-y".into());
    args.push(output_path.into());
    args
}
