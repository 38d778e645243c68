//! Backup sidecar record
//!
//! The sidecar lives next to the container as `<stem>.chapters.backup.json`
//! and holds a JSON array of chapters in their original order.

use crate::{Chapter, ChapterCoreError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix replacing the container extension
pub const BACKUP_SUFFIX: &str = "chapters.backup.json";

/// Sidecar path for a container: `movie.mkv` -> `movie.chapters.backup.json`
pub fn backup_path_for(container: &Path) -> PathBuf {
    container.with_extension(BACKUP_SUFFIX)
}

/// Ordered snapshot of a container's chapters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    chapters: Vec<Chapter>,
}

impl BackupRecord {
    pub fn new(chapters: Vec<Chapter>) -> Self {
        Self { chapters }
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn into_chapters(self) -> Vec<Chapter> {
        self.chapters
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Pretty JSON with two-space indentation, non-ASCII kept as is
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.chapters)?)
    }

    /// Parse sidecar JSON; empty or inconsistent records are rejected
    pub fn from_json(text: &str, origin: &Path) -> Result<Self> {
        let invalid = |reason: String| ChapterCoreError::InvalidBackup {
            path: origin.display().to_string(),
            reason,
        };

        let chapters: Vec<Chapter> = serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
        if chapters.is_empty() {
            return Err(invalid("backup contains no chapters".to_string()));
        }
        if let Some(bad) = chapters.iter().find(|c| !c.is_consistent()) {
            return Err(invalid(format!("chapter {} ends before it starts", bad.uid())));
        }

        Ok(Self { chapters })
    }

    /// Write atomically: a temp file in the same directory is persisted over `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ChapterCoreError::Io(e.error))?;

        tracing::debug!("💾 Wrote {} chapters to {}", self.chapters.len(), path.display());
        Ok(())
    }

    /// Read a sidecar. A missing file is an invalid backup.
    pub fn read_from(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChapterCoreError::InvalidBackup {
                    path: path.display().to_string(),
                    reason: "backup file not found".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&text, path)
    }
}
