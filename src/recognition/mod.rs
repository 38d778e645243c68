//! Song recognition: fingerprint a sample, then look the fingerprint up.

pub mod fingerprint;
pub mod netease;

pub use fingerprint::ExternalFingerprinter;
pub use netease::NeteaseCatalog;

use crate::audio::AudioSample;
use crate::error::RecognitionError;
use async_trait::async_trait;
use chapter_core::RecognitionResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Turns raw samples into an opaque fingerprint string
#[async_trait]
pub trait FingerprintGenerator: Send + Sync {
    async fn generate(&self, samples: &[f32], duration_seconds: u32) -> Result<String, RecognitionError>;
}

/// Looks a fingerprint up in a song catalog; `Ok(None)` is "no match"
#[async_trait]
pub trait CatalogMatcher: Send + Sync {
    async fn match_fingerprint(
        &self,
        fingerprint: &str,
        duration_seconds: u32,
    ) -> Result<Option<RecognitionResult>, RecognitionError>;
}

/// Fingerprinter and catalog composed under one per-sample time limit
#[derive(Clone)]
pub struct Recognizer {
    fingerprinter: Arc<dyn FingerprintGenerator>,
    catalog: Arc<dyn CatalogMatcher>,
    timeout: Duration,
}

impl Recognizer {
    pub fn new(
        fingerprinter: Arc<dyn FingerprintGenerator>,
        catalog: Arc<dyn CatalogMatcher>,
        timeout: Duration,
    ) -> Self {
        Self {
            fingerprinter,
            catalog,
            timeout,
        }
    }

    pub async fn recognize(&self, sample: &AudioSample) -> Result<Option<RecognitionResult>, RecognitionError> {
        let work = async {
            let fingerprint = self
                .fingerprinter
                .generate(&sample.samples, sample.duration_seconds)
                .await?;
            debug!("🔑 Fingerprint of {} chars", fingerprint.len());
            self.catalog
                .match_fingerprint(&fingerprint, sample.duration_seconds)
                .await
        };

        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| RecognitionError::TimedOut(self.timeout))?
    }
}
