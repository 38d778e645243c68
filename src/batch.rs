//! Directory mode: discover containers and run the pipeline over each

use crate::error::{RenameError, Result};
use crate::pipeline::{PipelineOrchestrator, RunReport, RunState};
use chapter_core::backup_path_for;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use walkdir::WalkDir;

const CONTAINER_EXTENSION: &str = "mkv";

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub recursive: bool,
    /// Skip containers that already have a backup sidecar
    pub skip_existing: bool,
    /// Containers processed at once; 1 keeps enumeration order
    pub workers: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            skip_existing: true,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContainerStatus {
    Skipped,
    Succeeded {
        state: RunState,
        changed: usize,
        unchanged: usize,
        failed: usize,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerResult {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: ContainerStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub total: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tally: BatchTally,
    pub containers: Vec<ContainerResult>,
}

impl BatchReport {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RenameError::Configuration(format!("cannot serialize report: {}", e)))?;
        std::fs::write(path, json).map_err(|e| RenameError::io(path, e))?;
        info!("💾 Report saved to: {}", path.display());
        Ok(())
    }
}

/// Containers under `root`, sorted by path. Only direct children unless `recursive`.
pub fn discover_containers(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(RenameError::Configuration(format!(
            "directory does not exist: {}",
            root.display()
        )));
    }

    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut containers = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("⚠️ Cannot read directory entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_container(entry.path()) {
            containers.push(entry.into_path());
        }
    }

    containers.sort();
    Ok(containers)
}

fn is_container(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(CONTAINER_EXTENSION))
}

/// Runs the pipeline over every container of a directory
pub struct BatchScanner {
    orchestrator: PipelineOrchestrator,
    options: BatchOptions,
}

impl BatchScanner {
    pub fn new(orchestrator: PipelineOrchestrator, options: BatchOptions) -> Self {
        Self { orchestrator, options }
    }

    pub async fn run(&self, root: &Path, cancel: &CancellationToken) -> Result<BatchReport> {
        let started_at = Utc::now();
        info!("🔍 Scanning {}{}", root.display(), if self.options.recursive { " (recursive)" } else { "" });

        let containers = discover_containers(root, self.options.recursive)?;
        info!("📹 Found {} MKV files", containers.len());

        let mut results = Vec::with_capacity(containers.len());
        let mut pending = Vec::new();
        for path in containers {
            if self.options.skip_existing && backup_path_for(&path).exists() {
                info!("⏭️ Skipping (backup exists): {}", path.display());
                results.push(ContainerResult { path, status: ContainerStatus::Skipped });
            } else {
                pending.push(path);
            }
        }

        let workers = self.options.workers.max(1);
        if workers == 1 {
            let total = pending.len();
            for (index, path) in pending.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    results.push(ContainerResult { path, status: ContainerStatus::Cancelled });
                    continue;
                }
                let status = process(&self.orchestrator, &path, index, total, cancel).await;
                results.push(ContainerResult { path, status });
            }
        } else {
            results.extend(self.run_parallel(pending, workers, cancel).await);
        }

        results.sort_by(|a, b| a.path.cmp(&b.path));
        let tally = tally(&results);

        info!("📊 Total: {}, succeeded: {}, failed: {}, skipped: {}",
              tally.total, tally.succeeded, tally.failed, tally.skipped);

        Ok(BatchReport {
            root: root.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            tally,
            containers: results,
        })
    }

    async fn run_parallel(&self, paths: Vec<PathBuf>, workers: usize, cancel: &CancellationToken) -> Vec<ContainerResult> {
        info!("🔧 Processing with {} workers", workers);
        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel(workers);
        let total = paths.len();

        for (index, path) in paths.into_iter().enumerate() {
            let orchestrator = self.orchestrator.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let status = match semaphore.acquire_owned().await {
                    Ok(_permit) if !cancel.is_cancelled() => process(&orchestrator, &path, index, total, &cancel).await,
                    Ok(_) => ContainerStatus::Cancelled,
                    Err(e) => ContainerStatus::Failed { error: e.to_string() },
                };
                if let Err(e) = tx.send(ContainerResult { path, status }).await {
                    error!("Failed to send result: {}", e);
                }
            });
        }

        // Close the channel once every task has reported
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }
}

/// One container; the progress and failure lines go out under the shared log lock
async fn process(
    orchestrator: &PipelineOrchestrator,
    path: &Path,
    index: usize,
    total: usize,
    cancel: &CancellationToken,
) -> ContainerStatus {
    {
        let _log = orchestrator.log_lock().lock().await;
        info!("📹 Processing {}/{}: {}", index + 1, total, path.display());
    }
    let result = orchestrator.run(path, cancel).await;
    if let Err(e) = &result {
        if !matches!(e, RenameError::Cancelled) {
            let _log = orchestrator.log_lock().lock().await;
            error!("❌ Failed: {}: {}", path.display(), e);
        }
    }
    status_of(result)
}

fn status_of(result: Result<RunReport>) -> ContainerStatus {
    match result {
        Ok(report) => ContainerStatus::Succeeded {
            state: report.state,
            changed: report.changed(),
            unchanged: report.unchanged(),
            failed: report.failed(),
        },
        Err(RenameError::Cancelled) => ContainerStatus::Cancelled,
        Err(e) => ContainerStatus::Failed { error: e.to_string() },
    }
}

fn tally(results: &[ContainerResult]) -> BatchTally {
    let mut tally = BatchTally {
        total: results.len(),
        ..BatchTally::default()
    };
    for result in results {
        match result.status {
            ContainerStatus::Skipped => tally.skipped += 1,
            ContainerStatus::Succeeded { .. } => tally.succeeded += 1,
            ContainerStatus::Failed { .. } | ContainerStatus::Cancelled => tally.failed += 1,
        }
    }
    tally
}
