//! Chapter Core - chapter data model, Matroska chapter codecs, backups and title templates

pub mod chapter;
pub mod xml;
pub mod simple;
pub mod backup;
pub mod song;
pub mod template;
pub mod sampling;

pub use chapter::{Chapter, ChapterTime};
pub use backup::{backup_path_for, BackupRecord, BACKUP_SUFFIX};
pub use sampling::{SampleWindow, SamplingPolicy, SamplingStrategy, DEFAULT_CHAPTER_SECONDS};
pub use song::RecognitionResult;
pub use template::{TemplateSpec, TitleTemplate, PRESETS, TOKENS};

/// Result type for Chapter Core operations
pub type Result<T> = std::result::Result<T, ChapterCoreError>;

/// Error types for Chapter Core operations
#[derive(thiserror::Error, Debug)]
pub enum ChapterCoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Simple chapter format error: {0}")]
    SimpleFormat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Chapter {index} is missing <{element}>")]
    MissingElement { index: usize, element: &'static str },

    #[error("Unexpected root element <{0}>, expected <Chapters>")]
    UnexpectedRoot(String),

    #[error("Unknown template token {{{0}}}")]
    UnknownToken(String),

    #[error("Unbalanced brace in template at byte {0}")]
    UnbalancedBrace(usize),

    #[error("Unknown template preset: {0}")]
    UnknownPreset(String),

    #[error("Invalid backup file {path}: {reason}")]
    InvalidBackup { path: String, reason: String },
}

impl ChapterCoreError {
    /// Whether this error reports a malformed document rather than an I/O failure
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ChapterCoreError::Xml(_)
                | ChapterCoreError::SimpleFormat(_)
                | ChapterCoreError::Json(_)
                | ChapterCoreError::InvalidTimestamp(_)
                | ChapterCoreError::MissingElement { .. }
                | ChapterCoreError::UnexpectedRoot(_)
                | ChapterCoreError::InvalidBackup { .. }
        )
    }
}
