//! Fingerprints from an external command fed raw samples on stdin

use super::FingerprintGenerator;
use crate::audio::SAMPLE_RATE;
use crate::error::RecognitionError;
use crate::tools::{ToolInvocation, ToolRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Placeholders substituted inside fingerprinter arguments
const DURATION_PLACEHOLDER: &str = "{duration}";
const RATE_PLACEHOLDER: &str = "{sample_rate}";

/// Fingerprinter backed by an external command.
///
/// The command receives the samples as f32 little-endian bytes on stdin and
/// prints the fingerprint on stdout.
#[derive(Clone)]
pub struct ExternalFingerprinter {
    runner: Arc<dyn ToolRunner>,
    program: PathBuf,
    args: Vec<String>,
    sample_rate: u32,
    timeout: Option<Duration>,
}

impl ExternalFingerprinter {
    pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            args,
            sample_rate: SAMPLE_RATE,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn invocation(&self, samples: &[f32], duration_seconds: u32) -> ToolInvocation {
        let duration = duration_seconds.to_string();
        let rate = self.sample_rate.to_string();
        let args = self
            .args
            .iter()
            .map(|a| a.replace(DURATION_PLACEHOLDER, &duration).replace(RATE_PLACEHOLDER, &rate));

        let stdin: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let invocation = ToolInvocation::new(&self.program).args(args).stdin(stdin);
        match self.timeout {
            Some(timeout) => invocation.timeout(timeout),
            None => invocation,
        }
    }
}

#[async_trait]
impl FingerprintGenerator for ExternalFingerprinter {
    async fn generate(&self, samples: &[f32], duration_seconds: u32) -> Result<String, RecognitionError> {
        let expected = self.sample_rate as usize * duration_seconds as usize;
        if samples.len() != expected {
            return Err(RecognitionError::Fingerprint(format!(
                "expected {} samples, got {}",
                expected,
                samples.len()
            )));
        }

        let output = self
            .runner
            .run(self.invocation(samples, duration_seconds))
            .await
            .map_err(|e| RecognitionError::Fingerprint(e.to_string()))?;

        if !output.success() {
            return Err(RecognitionError::Fingerprint(format!(
                "exit status {:?}: {}",
                output.status,
                output.stderr_text()
            )));
        }

        let fingerprint = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if fingerprint.is_empty() {
            return Err(RecognitionError::Fingerprint("empty fingerprint".to_string()));
        }
        Ok(fingerprint)
    }
}
