//! ffmpeg-backed audio sampling at a chapter window

use crate::error::AudioError;
use crate::tools::{ToolInvocation, ToolRunner};
use chapter_core::SampleWindow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sample rate of every extracted buffer, matching the fingerprinter's input
pub const SAMPLE_RATE: u32 = 8000;

const BYTES_PER_SAMPLE: usize = 4;

/// Decoded mono f32 samples for one window
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_seconds: u32,
}

impl AudioSample {
    /// Little-endian byte form, as fed to the fingerprinter
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Pulls raw PCM windows out of a container with ffmpeg
#[derive(Clone)]
pub struct AudioSampleExtractor {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: PathBuf,
    sample_rate: u32,
    timeout: Option<Duration>,
}

impl AudioSampleExtractor {
    pub fn new(runner: Arc<dyn ToolRunner>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.into(),
            sample_rate: SAMPLE_RATE,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bytes a full window must provide
    pub fn expected_bytes(&self, duration_seconds: u32) -> usize {
        self.sample_rate as usize * duration_seconds as usize * BYTES_PER_SAMPLE
    }

    /// ffmpeg arguments for a window. Negative seeks are clamped to zero.
    pub fn invocation(&self, container: &Path, window: &SampleWindow) -> ToolInvocation {
        let seek = window.offset_seconds.max(0.0);
        let mut invocation = ToolInvocation::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error"])
            .arg("-ss")
            .arg(format!("{:.3}", seek))
            .arg("-i")
            .arg(container)
            .arg("-vn")
            .arg("-t")
            .arg(window.duration_seconds.to_string())
            .args(["-acodec", "pcm_f32le", "-f", "f32le"])
            .arg("-ar")
            .arg(self.sample_rate.to_string())
            .args(["-ac", "1", "-"]);
        if let Some(timeout) = self.timeout {
            invocation = invocation.timeout(timeout);
        }
        invocation
    }

    /// Decode exactly `sample_rate * duration` samples for `window`
    pub async fn extract(&self, container: &Path, window: &SampleWindow) -> Result<AudioSample, AudioError> {
        let output = self.runner.run(self.invocation(container, window)).await?;

        if !output.success() {
            return Err(AudioError::DecoderFailed {
                status: output.status,
                stderr: output.stderr_text(),
            });
        }

        let expected = self.expected_bytes(window.duration_seconds);
        if output.stdout.len() < expected {
            return Err(AudioError::InsufficientData {
                got: output.stdout.len(),
                expected,
            });
        }

        let samples: Vec<f32> = output.stdout[..expected]
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        debug!(
            "🎵 Extracted {} samples at {:.3}s from {}",
            samples.len(),
            window.offset_seconds,
            container.display()
        );

        Ok(AudioSample {
            samples,
            sample_rate: self.sample_rate,
            duration_seconds: window.duration_seconds,
        })
    }
}
