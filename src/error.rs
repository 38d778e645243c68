//! Run-level error taxonomy

use chapter_core::ChapterCoreError;
use std::path::PathBuf;
use std::time::Duration;

/// Errors that end a run. Per-chapter problems never become a `RenameError`;
/// they are recorded as outcomes instead.
#[derive(thiserror::Error, Debug)]
pub enum RenameError {
    /// Malformed chapter document or backup sidecar
    #[error("Structural error: {0}")]
    Structural(#[source] ChapterCoreError),

    /// External tool missing or exiting non-zero on a step that cannot be skipped
    #[error("{tool} failed: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("No match: {0}")]
    RecognitionMiss(String),

    /// Bad settings, detected before any destructive work
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenameError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RenameError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        RenameError::ToolInvocation {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

impl From<ChapterCoreError> for RenameError {
    fn from(err: ChapterCoreError) -> Self {
        match err {
            ChapterCoreError::Io(source) => RenameError::Io {
                path: PathBuf::new(),
                source,
            },
            ChapterCoreError::UnknownToken(_)
            | ChapterCoreError::UnbalancedBrace(_)
            | ChapterCoreError::UnknownPreset(_) => RenameError::Configuration(err.to_string()),
            other => RenameError::Structural(other),
        }
    }
}

/// Failure of an external process invocation
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("I/O error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to pull an audio sample for one chapter
#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("insufficient audio data: got {got} bytes, expected {expected}")]
    InsufficientData { got: usize, expected: usize },

    #[error("decoder exited with status {status:?}: {stderr}")]
    DecoderFailed { status: Option<i32>, stderr: String },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Failure while fingerprinting or looking up a sample
#[derive(thiserror::Error, Debug)]
pub enum RecognitionError {
    #[error("fingerprint generation failed: {0}")]
    Fingerprint(String),

    #[error("catalog request failed: {0}")]
    Catalog(String),

    #[error("recognition timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<reqwest::Error> for RecognitionError {
    fn from(err: reqwest::Error) -> Self {
        RecognitionError::Catalog(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RenameError>;
