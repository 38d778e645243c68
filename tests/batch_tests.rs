mod common;

use chapter_core::backup_path_for;
use common::*;
use mkv_chapter_renamer::batch::{BatchOptions, BatchScanner, ContainerStatus};
use mkv_chapter_renamer::{BatchTally, RunState};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn scanner(harness: &Harness, options: BatchOptions) -> BatchScanner {
    BatchScanner::new(harness.orchestrator.clone(), options)
}

#[tokio::test]
async fn test_second_run_skips_processed_files() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new(settings());
    register_five_songs(&harness.catalog);
    let first = container(&harness.tools, dir.path(), "a.mkv", five_chapters());
    let second = container(&harness.tools, dir.path(), "b.mkv", five_chapters());

    let batch = scanner(&harness, BatchOptions::default());
    let report = batch.run(dir.path(), &CancellationToken::new()).await.unwrap();
    assert_eq!(report.tally, BatchTally { total: 2, skipped: 0, succeeded: 2, failed: 0 });
    assert!(backup_path_for(&first).exists());
    assert!(backup_path_for(&second).exists());

    let calls_after_first = harness.recognition_calls();
    assert_eq!(calls_after_first, 10);

    let report = batch.run(dir.path(), &CancellationToken::new()).await.unwrap();
    assert_eq!(report.tally, BatchTally { total: 2, skipped: 2, succeeded: 0, failed: 0 });
    assert_eq!(harness.recognition_calls(), calls_after_first);
    assert_eq!(harness.catalog.calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_no_skip_processes_again() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new(settings());
    register_five_songs(&harness.catalog);
    container(&harness.tools, dir.path(), "a.mkv", five_chapters());

    let options = BatchOptions { skip_existing: false, ..BatchOptions::default() };
    let batch = scanner(&harness, options);
    batch.run(dir.path(), &CancellationToken::new()).await.unwrap();
    let report = batch.run(dir.path(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.tally.succeeded, 1);
    assert_eq!(harness.recognition_calls(), 10);
    // Titles already match, so the second run writes nothing
    assert!(matches!(
        report.containers[0].status,
        ContainerStatus::Succeeded { state: RunState::Unchanged, .. }
    ));
    assert_eq!(harness.tools.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failures_are_counted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new(settings());
    register_five_songs(&harness.catalog);
    container(&harness.tools, dir.path(), "a.mkv", five_chapters());
    let broken = container(&harness.tools, dir.path(), "b.mkv", five_chapters());
    container(&harness.tools, dir.path(), "c.mkv", five_chapters());
    harness.tools.fail_extract(&broken);

    let report = scanner(&harness, BatchOptions::default())
        .run(dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.tally, BatchTally { total: 3, skipped: 0, succeeded: 2, failed: 1 });
    assert_eq!(report.containers[1].path, broken);
    assert!(matches!(report.containers[1].status, ContainerStatus::Failed { .. }));
}

#[tokio::test]
async fn test_recursive_parallel_run_and_report() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("disc2");
    std::fs::create_dir_all(&nested).unwrap();

    let harness = Harness::new(settings());
    register_five_songs(&harness.catalog);
    for name in ["a.mkv", "b.mkv", "c.mkv"] {
        container(&harness.tools, dir.path(), name, five_chapters());
    }
    container(&harness.tools, &nested, "d.mkv", five_chapters());
    std::fs::write(dir.path().join("cover.jpg"), b"").unwrap();

    let flat = scanner(&harness, BatchOptions { workers: 3, ..BatchOptions::default() });
    let report = flat.run(dir.path(), &CancellationToken::new()).await.unwrap();
    assert_eq!(report.tally.total, 3);

    let deep = scanner(&harness, BatchOptions { recursive: true, workers: 3, ..BatchOptions::default() });
    let report = deep.run(dir.path(), &CancellationToken::new()).await.unwrap();
    assert_eq!(report.tally, BatchTally { total: 4, skipped: 3, succeeded: 1, failed: 0 });

    let paths: Vec<_> = report.containers.iter().map(|c| c.path.clone()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);

    let report_path = dir.path().join("report.json");
    report.write_to(&report_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["tally"]["skipped"], 3);
    assert_eq!(json["containers"][3]["status"], "succeeded");
    assert!(json["started_at"].is_string());
}

#[tokio::test]
async fn test_cancelled_batch_starts_nothing() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new(settings());
    container(&harness.tools, dir.path(), "a.mkv", five_chapters());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = scanner(&harness, BatchOptions::default()).run(dir.path(), &cancel).await.unwrap();

    assert_eq!(report.tally.failed, 1);
    assert!(matches!(report.containers[0].status, ContainerStatus::Cancelled));
    assert_eq!(harness.tools.extracts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_progress_lines_wait_for_the_log_lock() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new(settings());
    register_five_songs(&harness.catalog);
    container(&harness.tools, dir.path(), "a.mkv", five_chapters());
    container(&harness.tools, dir.path(), "b.mkv", five_chapters());

    let batch = scanner(&harness, BatchOptions { workers: 2, ..BatchOptions::default() });
    let cancel = CancellationToken::new();
    let log = harness.orchestrator.log_lock().clone().lock_owned().await;

    let run = batch.run(dir.path(), &cancel);
    tokio::pin!(run);
    assert!(tokio::time::timeout(Duration::from_millis(100), &mut run).await.is_err());
    assert_eq!(harness.tools.extracts.load(Ordering::SeqCst), 0);

    drop(log);
    let report = run.await.unwrap();
    assert_eq!(report.tally.succeeded, 2);
}
