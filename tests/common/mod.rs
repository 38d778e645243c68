//! Deterministic stand-ins for the external tools, fingerprinter and catalog

#![allow(dead_code)]

use async_trait::async_trait;
use chapter_core::{simple, xml, Chapter, ChapterTime, RecognitionResult, TitleTemplate};
use mkv_chapter_renamer::error::{RecognitionError, ToolError};
use mkv_chapter_renamer::{
    AudioSampleExtractor, BackupPolicy, CatalogMatcher, ChapterStore, FingerprintGenerator, PipelineOrchestrator,
    PipelineSettings, Recognizer, ToolInvocation, ToolOutput, ToolPaths, ToolRunner, SAMPLE_RATE,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// In-memory mkvextract / mkvpropedit / ffmpeg.
///
/// Chapters live in a map keyed by container path; ffmpeg answers with a
/// buffer whose samples all equal the seek offset, so every window gets a
/// distinct fingerprint.
#[derive(Default)]
pub struct FakeTools {
    containers: Mutex<HashMap<PathBuf, Vec<Chapter>>>,
    short_seeks: Mutex<HashSet<String>>,
    failing_extracts: Mutex<HashSet<PathBuf>>,
    pub extracts: AtomicUsize,
    pub decodes: AtomicUsize,
    pub writes: AtomicUsize,
    pub simple_writes: AtomicUsize,
}

impl FakeTools {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, container: &Path, chapters: Vec<Chapter>) {
        self.containers.lock().unwrap().insert(container.to_path_buf(), chapters);
    }

    pub fn chapters(&self, container: &Path) -> Option<Vec<Chapter>> {
        self.containers.lock().unwrap().get(container).cloned()
    }

    /// Decodes seeking to `seek` (formatted like `125.000`) return too few bytes
    pub fn short_buffer_at(&self, seek: &str) {
        self.short_seeks.lock().unwrap().insert(seek.to_string());
    }

    pub fn fail_extract(&self, container: &Path) {
        self.failing_extracts.lock().unwrap().insert(container.to_path_buf());
    }

    fn ok() -> ToolOutput {
        ToolOutput { status: Some(0), stdout: Vec::new(), stderr: Vec::new() }
    }

    fn failed(message: &str) -> ToolOutput {
        ToolOutput { status: Some(2), stdout: Vec::new(), stderr: message.as_bytes().to_vec() }
    }

    fn extract(&self, invocation: &ToolInvocation) -> ToolOutput {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        let container = PathBuf::from(&invocation.args[0]);
        if self.failing_extracts.lock().unwrap().contains(&container) {
            return Self::failed("Error: not a Matroska file");
        }
        let out = invocation.arg_after("chapters").unwrap().to_path_buf();
        let document = match self.chapters(&container) {
            Some(chapters) => xml::encode(&chapters).unwrap(),
            None => String::new(),
        };
        std::fs::write(out, document).unwrap();
        Self::ok()
    }

    fn propedit(&self, invocation: &ToolInvocation) -> ToolOutput {
        let container = PathBuf::from(&invocation.args[0]);
        let input = invocation.arg_after("--chapters").unwrap();
        let body = std::fs::read_to_string(input).unwrap();

        let chapters = if input.extension().is_some_and(|e| e == "txt") {
            self.simple_writes.fetch_add(1, Ordering::SeqCst);
            simple::decode(&body).unwrap()
        } else {
            self.writes.fetch_add(1, Ordering::SeqCst);
            xml::decode(&body).unwrap()
        };
        self.insert(&container, chapters);
        Self::ok()
    }

    fn decode(&self, invocation: &ToolInvocation) -> ToolOutput {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let seek = invocation.arg_after("-ss").unwrap().to_string_lossy().into_owned();
        let seconds: usize = invocation.arg_after("-t").unwrap().to_string_lossy().parse().unwrap();

        let mut count = SAMPLE_RATE as usize * seconds;
        if self.short_seeks.lock().unwrap().contains(&seek) {
            count /= 2;
        }
        let value: f32 = seek.parse().unwrap();
        let stdout = std::iter::repeat(value.to_le_bytes()).take(count).flatten().collect();
        ToolOutput { status: Some(0), stdout, stderr: Vec::new() }
    }
}

#[async_trait]
impl ToolRunner for FakeTools {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        Ok(match invocation.program_name().as_str() {
            "mkvextract" => self.extract(&invocation),
            "mkvpropedit" => self.propedit(&invocation),
            "ffmpeg" => self.decode(&invocation),
            other => Self::failed(&format!("unexpected tool {}", other)),
        })
    }
}

/// Fingerprint is `fp-<first sample>`
#[derive(Default)]
pub struct FakeFingerprinter {
    pub calls: AtomicUsize,
}

#[async_trait]
impl FingerprintGenerator for FakeFingerprinter {
    async fn generate(&self, samples: &[f32], _duration_seconds: u32) -> Result<String, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("fp-{}", samples.first().copied().unwrap_or_default()))
    }
}

/// Catalog answering from a fixed fingerprint table
#[derive(Default)]
pub struct FakeCatalog {
    songs: Mutex<HashMap<String, RecognitionResult>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    pub calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn add(&self, fingerprint: &str, song: RecognitionResult) {
        self.songs.lock().unwrap().insert(fingerprint.to_string(), song);
    }

    /// Cancel `token` once `calls` lookups have been answered
    pub fn cancel_after(&self, calls: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((calls, token));
    }
}

#[async_trait]
impl CatalogMatcher for FakeCatalog {
    async fn match_fingerprint(
        &self,
        fingerprint: &str,
        _duration_seconds: u32,
    ) -> Result<Option<RecognitionResult>, RecognitionError> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if calls >= *limit {
                token.cancel();
            }
        }
        Ok(self.songs.lock().unwrap().get(fingerprint).cloned())
    }
}

pub struct Harness {
    pub tools: Arc<FakeTools>,
    pub fingerprinter: Arc<FakeFingerprinter>,
    pub catalog: Arc<FakeCatalog>,
    pub orchestrator: PipelineOrchestrator,
}

impl Harness {
    pub fn new(settings: PipelineSettings) -> Self {
        let tools = FakeTools::new();
        let fingerprinter = Arc::new(FakeFingerprinter::default());
        let catalog = Arc::new(FakeCatalog::default());

        let runner: Arc<dyn ToolRunner> = tools.clone();
        let store = ChapterStore::new(runner.clone(), &ToolPaths::default());
        let audio = AudioSampleExtractor::new(runner, "ffmpeg");
        let recognizer = Recognizer::new(fingerprinter.clone(), catalog.clone(), Duration::from_secs(5));
        let orchestrator = PipelineOrchestrator::new(store, audio, recognizer, settings);

        Self { tools, fingerprinter, catalog, orchestrator }
    }

    pub fn recognition_calls(&self) -> usize {
        self.fingerprinter.calls.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> ChapterStore {
        ChapterStore::new(self.tools.clone(), &ToolPaths::default())
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        template: TitleTemplate::new("{name} - {artists}"),
        backup: BackupPolicy::CreateIfMissing,
        ..PipelineSettings::default()
    }
}

/// Five one-minute chapters titled `Chapter 0N`
pub fn five_chapters() -> Vec<Chapter> {
    (0..5u64)
        .map(|i| {
            Chapter::new(
                format!("10{}", i),
                ChapterTime::from_millis(i * 60_000),
                Some(ChapterTime::from_millis((i + 1) * 60_000)),
                format!("Chapter {:02}", i + 1),
            )
        })
        .collect()
}

pub fn song(name: &str) -> RecognitionResult {
    RecognitionResult::new(name, vec!["初音ミク".to_string(), "malo".to_string()])
}

/// Register a song for each of the five chapters under the default start strategy
pub fn register_five_songs(catalog: &FakeCatalog) {
    for i in 0..5 {
        let seek = i * 60 + 5;
        catalog.add(&format!("fp-{}", seek), song(&format!("Song {}", i + 1)));
    }
}

/// Create an (empty) container file on disk and register its chapters
pub fn container(tools: &FakeTools, dir: &Path, name: &str, chapters: Vec<Chapter>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"").unwrap();
    tools.insert(&path, chapters);
    path
}
