//! MKV Chapter Renamer
//!
//! Recognizes the song playing at each chapter mark of an MKV file and
//! renames the chapters from a title template, with backup and restore.

pub mod app;
pub mod audio;
pub mod backup;
pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod mkv;
pub mod pipeline;
pub mod recognition;
pub mod tools;

// Re-export main types for easy access
pub use crate::audio::{AudioSample, AudioSampleExtractor, SAMPLE_RATE};
pub use crate::backup::{BackupPolicy, BackupRestoreManager, SnapshotOutcome};
pub use crate::batch::{BatchOptions, BatchReport, BatchScanner, BatchTally};
pub use crate::config::{Config, Overrides, ToolPaths};
pub use crate::error::{RenameError, Result};
pub use crate::mkv::ChapterStore;
pub use crate::pipeline::{ChapterOutcome, PipelineOrchestrator, PipelineSettings, RunReport, RunState};
pub use crate::recognition::{CatalogMatcher, FingerprintGenerator, Recognizer};
pub use crate::tools::{SystemToolRunner, ToolInvocation, ToolOutput, ToolRunner};
