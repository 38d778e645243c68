//! Single-container recognition and rename run
//!
//! `Idle -> ChaptersExtracted -> BackedUp -> Recognizing(i)... -> Committed`,
//! ending early in `NothingToDo` (no chapters), `Unchanged` (no title
//! changed), `DryRun` or `Aborted` (cancelled). Chapters are processed in
//! order and a failing chapter only keeps its old title.

use crate::audio::AudioSampleExtractor;
use crate::backup::{BackupPolicy, BackupRestoreManager, SnapshotOutcome};
use crate::error::{AudioError, RenameError, Result};
use crate::mkv::{self, ChapterStore};
use crate::recognition::Recognizer;
use chapter_core::{Chapter, RecognitionResult, SamplingPolicy, TitleTemplate};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    ChaptersExtracted,
    BackedUp,
    Recognizing(usize),
    Committed,
    NothingToDo,
    Unchanged,
    DryRun,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Committed | RunState::NothingToDo | RunState::Unchanged | RunState::DryRun | RunState::Aborted
        )
    }
}

/// What happened to one chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChapterOutcome {
    Renamed { title: String },
    /// Recognized, but the rendered title equals the current one
    Unchanged,
    /// Title kept because the chapter could not be recognized
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterRecord {
    pub index: usize,
    pub uid: String,
    pub start_time: String,
    pub original_title: String,
    pub outcome: ChapterOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub container: PathBuf,
    pub output: PathBuf,
    pub state: RunState,
    pub chapters: Vec<ChapterRecord>,
    #[serde(skip)]
    pub backup: Option<SnapshotOutcome>,
}

impl RunReport {
    fn new(container: &Path, output: &Path) -> Self {
        Self {
            container: container.to_path_buf(),
            output: output.to_path_buf(),
            state: RunState::Idle,
            chapters: Vec::new(),
            backup: None,
        }
    }

    pub fn changed(&self) -> usize {
        self.count(|o| matches!(o, ChapterOutcome::Renamed { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, ChapterOutcome::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ChapterOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ChapterOutcome) -> bool) -> usize {
        self.chapters.iter().filter(|c| pred(&c.outcome)).count()
    }
}

/// One async lock per container path
#[derive(Debug, Default)]
pub struct ContainerLocks {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContainerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, container: &Path) -> ContainerGuard<'_> {
        let key = std::fs::canonicalize(container).unwrap_or_else(|_| container.to_path_buf());
        let lock = {
            let mut locks = self.table();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        ContainerGuard {
            locks: self,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Paths currently locked or waited on
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn table(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held for the duration of a run; the table entry goes away with the last holder
pub struct ContainerGuard<'a> {
    locks: &'a ContainerLocks,
    key: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.table();
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

/// Per-run settings, resolved and validated beforehand
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub sampling: SamplingPolicy,
    pub template: TitleTemplate,
    pub backup: BackupPolicy,
    /// Commit target, defaults to the source container
    pub output: Option<PathBuf>,
    pub dry_run: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sampling: SamplingPolicy::default(),
            template: TitleTemplate::new(chapter_core::PRESETS[0].format),
            backup: BackupPolicy::CreateIfMissing,
            output: None,
            dry_run: false,
        }
    }
}

#[derive(Clone)]
pub struct PipelineOrchestrator {
    store: ChapterStore,
    backups: BackupRestoreManager,
    audio: AudioSampleExtractor,
    recognizer: Recognizer,
    settings: PipelineSettings,
    locks: Arc<ContainerLocks>,
    log_lock: Arc<tokio::sync::Mutex<()>>,
}

impl PipelineOrchestrator {
    pub fn new(store: ChapterStore, audio: AudioSampleExtractor, recognizer: Recognizer, settings: PipelineSettings) -> Self {
        Self {
            backups: BackupRestoreManager::new(store.clone()),
            store,
            audio,
            recognizer,
            settings,
            locks: Arc::new(ContainerLocks::new()),
            log_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Share container locks and the log lock with other orchestrators
    pub fn with_shared_locks(mut self, locks: Arc<ContainerLocks>, log_lock: Arc<tokio::sync::Mutex<()>>) -> Self {
        self.locks = locks;
        self.log_lock = log_lock;
        self
    }

    /// Lock held while a container's log block is written
    pub fn log_lock(&self) -> &Arc<tokio::sync::Mutex<()>> {
        &self.log_lock
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run against one container; `output` overrides the configured commit target
    pub async fn run(&self, container: &Path, cancel: &CancellationToken) -> Result<RunReport> {
        self.run_to(container, None, cancel).await
    }

    pub async fn run_to(&self, container: &Path, output: Option<&Path>, cancel: &CancellationToken) -> Result<RunReport> {
        let name = container
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| container.display().to_string());
        let span = info_span!("container", file = %name);

        async {
            let _container_guard = self.locks.lock(container).await;
            let output = output
                .or(self.settings.output.as_deref())
                .unwrap_or(container)
                .to_path_buf();
            self.execute(container, &output, cancel).await
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, container: &Path, output: &Path, cancel: &CancellationToken) -> Result<RunReport> {
        let mut report = RunReport::new(container, output);
        debug!("State {:?}", report.state);

        let chapters = self.store.read_chapters(container).await?;
        report.state = RunState::ChaptersExtracted;
        debug!("State {:?} ({} chapters)", report.state, chapters.len());

        if chapters.is_empty() {
            report.state = RunState::NothingToDo;
            self.emit_summary(&report).await;
            return Ok(report);
        }

        if !self.settings.dry_run {
            report.backup = Some(self.backups.snapshot(container, &chapters, self.settings.backup)?);
            report.state = RunState::BackedUp;
        }

        let mut updated = chapters.clone();
        let mut previous_song: Option<String> = None;

        for (i, chapter) in chapters.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.abort(report).await;
            }
            report.state = RunState::Recognizing(i);
            debug!("🎬 Chapter {}/{}: {}", i + 1, chapters.len(), chapter);

            let recognized = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.abort(report).await,
                recognized = self.recognize_chapter(container, chapter) => recognized,
            };

            let outcome = match recognized {
                Ok(song) => {
                    let title = self.settings.template.render_or_fallback(&song);
                    if previous_song.as_deref() == Some(title.as_str()) {
                        warn!(
                            "⚠️ Chapter {} has the same title as the previous chapter ({}); the sample may straddle two songs, try another offset",
                            i + 1,
                            title
                        );
                    }
                    previous_song = Some(title.clone());

                    if title == chapter.title() {
                        ChapterOutcome::Unchanged
                    } else {
                        updated[i].set_title(title.clone());
                        ChapterOutcome::Renamed { title }
                    }
                }
                Err(e) => {
                    debug!("Chapter {} kept its title: {}", i + 1, e);
                    previous_song = None;
                    ChapterOutcome::Failed { reason: e.to_string() }
                }
            };

            report.chapters.push(ChapterRecord {
                index: i,
                uid: chapter.uid().to_string(),
                start_time: chapter.start_time().to_string(),
                original_title: chapter.title().to_string(),
                outcome,
            });
        }

        if cancel.is_cancelled() {
            return self.abort(report).await;
        }

        report.state = if report.changed() == 0 {
            RunState::Unchanged
        } else if self.settings.dry_run {
            RunState::DryRun
        } else {
            mkv::prepare_output(container, output).await?;
            self.store.write_chapters(output, &updated).await?;
            RunState::Committed
        };

        self.emit_summary(&report).await;
        Ok(report)
    }

    /// Sample, fingerprint and look up one chapter
    async fn recognize_chapter(&self, container: &Path, chapter: &Chapter) -> Result<RecognitionResult> {
        let window = self
            .settings
            .sampling
            .sample_window(chapter.start_seconds(), chapter.end_seconds());
        debug!("Sampling {:.3}s +{}s", window.offset_seconds, window.duration_seconds);

        let sample = self.audio.extract(container, &window).await.map_err(|e| match e {
            AudioError::InsufficientData { .. } => RenameError::RecognitionMiss(e.to_string()),
            other => RenameError::tool("ffmpeg", other.to_string()),
        })?;

        match self.recognizer.recognize(&sample).await {
            Ok(Some(song)) => {
                debug!("🎵 Recognized: {} - {}", song.name, song.artists_joined());
                Ok(song)
            }
            Ok(None) => Err(RenameError::RecognitionMiss("no match".to_string())),
            Err(e) => Err(RenameError::RecognitionMiss(e.to_string())),
        }
    }

    async fn abort(&self, mut report: RunReport) -> Result<RunReport> {
        report.state = RunState::Aborted;
        let _log = self.log_lock.lock().await;
        warn!(
            "🛑 Cancelled after {} chapters; nothing written to {}",
            report.chapters.len(),
            report.output.display()
        );
        Err(RenameError::Cancelled)
    }

    /// Emit the per-chapter outcome block without interleaving with other containers
    async fn emit_summary(&self, report: &RunReport) {
        let _log = self.log_lock.lock().await;

        info!("🎬 {}", report.container.display());
        for record in &report.chapters {
            match &record.outcome {
                ChapterOutcome::Renamed { title } => {
                    info!("  ✅ {:2}. [{}] {} -> {}", record.index + 1, record.start_time, record.original_title, title)
                }
                ChapterOutcome::Unchanged => {
                    info!("  ➖ {:2}. [{}] {} (unchanged)", record.index + 1, record.start_time, record.original_title)
                }
                ChapterOutcome::Failed { reason } => {
                    warn!("  ❌ {:2}. [{}] {} ({})", record.index + 1, record.start_time, record.original_title, reason)
                }
            }
        }

        match report.state {
            RunState::NothingToDo => info!("ℹ️ No chapters found, nothing to do"),
            RunState::Unchanged => info!("ℹ️ No chapter titles changed, file left untouched"),
            RunState::DryRun => info!("🧪 Dry run, nothing written"),
            RunState::Committed => info!("💾 Chapters written to {}", report.output.display()),
            _ => {}
        }
        if !report.chapters.is_empty() {
            info!(
                "📊 Changed: {}, unchanged: {}, failed: {}",
                report.changed(),
                report.unchanged(),
                report.failed()
            );
        }
    }
}
