//! Wiring shared by the binaries

use crate::audio::AudioSampleExtractor;
use crate::config::{Config, ToolPaths};
use crate::error::{RenameError, Result};
use crate::mkv::ChapterStore;
use crate::pipeline::{PipelineOrchestrator, PipelineSettings};
use crate::recognition::{ExternalFingerprinter, NeteaseCatalog, Recognizer};
use crate::tools::ToolRunner;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Build the production orchestrator from validated configuration
pub fn build_orchestrator(
    config: &Config,
    tools: &ToolPaths,
    runner: Arc<dyn ToolRunner>,
    dry_run: bool,
) -> Result<PipelineOrchestrator> {
    let timeout = config.chapter_timeout();

    let fingerprint_program = tools.fingerprinter.clone().ok_or_else(|| {
        RenameError::Configuration("no fingerprinter configured (tools.fingerprinter)".into())
    })?;
    let fingerprinter = ExternalFingerprinter::new(runner.clone(), fingerprint_program, tools.fingerprinter_args.clone())
        .with_timeout(timeout);
    let catalog = NeteaseCatalog::new(&config.catalog.endpoint, config.catalog.requests_per_second, timeout)
        .map_err(|e| RenameError::Configuration(e.to_string()))?;
    let recognizer = Recognizer::new(Arc::new(fingerprinter), Arc::new(catalog), timeout);

    let store = ChapterStore::new(runner.clone(), tools);
    let audio = AudioSampleExtractor::new(runner, &tools.ffmpeg).with_timeout(timeout);

    let settings = PipelineSettings {
        sampling: config.sampling_policy(),
        template: config.title_template()?,
        backup: config.backup_policy(),
        output: config.output.clone(),
        dry_run,
    };

    Ok(PipelineOrchestrator::new(store, audio, recognizer, settings))
}

/// Cancel `token` on the first Ctrl-C
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, finishing the current step and stopping");
            token.cancel();
        }
    });
}
