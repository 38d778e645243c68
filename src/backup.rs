//! Chapter backup and restore
//!
//! Snapshots go to a JSON sidecar next to the container. Restores write the
//! snapshot back through the simple chapter format, independent of the XML
//! path the pipeline commits through.

use crate::error::{RenameError, Result};
use crate::mkv::ChapterStore;
use chapter_core::{backup_path_for, BackupRecord, Chapter};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Number of chapters shown before a restore
const PREVIEW_CHAPTERS: usize = 5;

/// What a run does with an existing sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPolicy {
    /// Never snapshot
    Disabled,
    /// Snapshot only when no sidecar exists yet
    CreateIfMissing,
    /// Always replace the sidecar
    Overwrite,
}

/// Result of a snapshot request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Written(PathBuf),
    KeptExisting(PathBuf),
    Declined(PathBuf),
    Skipped,
}

#[derive(Clone)]
pub struct BackupRestoreManager {
    store: ChapterStore,
}

impl BackupRestoreManager {
    pub fn new(store: ChapterStore) -> Self {
        Self { store }
    }

    pub fn backup_path(&self, container: &Path) -> PathBuf {
        backup_path_for(container)
    }

    pub fn has_backup(&self, container: &Path) -> bool {
        backup_path_for(container).exists()
    }

    /// Snapshot `chapters` for `container` according to `policy`
    pub fn snapshot(&self, container: &Path, chapters: &[Chapter], policy: BackupPolicy) -> Result<SnapshotOutcome> {
        let path = backup_path_for(container);
        match policy {
            BackupPolicy::Disabled => Ok(SnapshotOutcome::Skipped),
            BackupPolicy::CreateIfMissing if path.exists() => match BackupRecord::read_from(&path) {
                Ok(_) => {
                    info!("💾 Keeping existing backup: {}", path.display());
                    Ok(SnapshotOutcome::KeptExisting(path))
                }
                Err(e) => {
                    warn!("⚠️ Existing backup {} is unusable ({}), replacing it", path.display(), e);
                    self.write_snapshot(&path, chapters)?;
                    Ok(SnapshotOutcome::Written(path))
                }
            },
            BackupPolicy::CreateIfMissing | BackupPolicy::Overwrite => {
                self.write_snapshot(&path, chapters)?;
                Ok(SnapshotOutcome::Written(path))
            }
        }
    }

    /// Snapshot on user request: an existing sidecar is replaced only if `confirm` agrees
    pub fn snapshot_interactive<F>(&self, container: &Path, chapters: &[Chapter], confirm: F) -> Result<SnapshotOutcome>
    where
        F: FnOnce(&Path) -> bool,
    {
        let path = backup_path_for(container);
        if path.exists() && !confirm(&path) {
            info!("Backup left untouched: {}", path.display());
            return Ok(SnapshotOutcome::Declined(path));
        }
        self.write_snapshot(&path, chapters)?;
        Ok(SnapshotOutcome::Written(path))
    }

    /// Read `container`'s chapters as they are now and snapshot them
    pub async fn backup_current<F>(&self, container: &Path, confirm: F) -> Result<SnapshotOutcome>
    where
        F: FnOnce(&Path) -> bool,
    {
        let chapters = self.store.read_chapters(container).await?;
        if chapters.is_empty() {
            return Err(RenameError::Configuration(format!(
                "{} has no chapters to back up",
                container.display()
            )));
        }
        self.snapshot_interactive(container, &chapters, confirm)
    }

    /// Load a snapshot. `backup_file` overrides the derived sidecar path.
    pub fn load(&self, container: &Path, backup_file: Option<&Path>) -> Result<Vec<Chapter>> {
        let path = backup_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| backup_path_for(container));
        let record = BackupRecord::read_from(&path).map_err(RenameError::Structural)?;
        Ok(record.into_chapters())
    }

    /// Write the snapshot back into `target`
    pub async fn restore(&self, container: &Path, target: &Path, backup_file: Option<&Path>) -> Result<Vec<Chapter>> {
        let chapters = self.load(container, backup_file)?;

        info!("♻️ Restoring {} chapters to {}", chapters.len(), target.display());
        for (i, chapter) in chapters.iter().take(PREVIEW_CHAPTERS).enumerate() {
            info!("  {:2}. [{}] {}", i + 1, chapter.start_time(), chapter.title());
        }
        if chapters.len() > PREVIEW_CHAPTERS {
            info!("  ... and {} more", chapters.len() - PREVIEW_CHAPTERS);
        }

        crate::mkv::prepare_output(container, target).await?;
        self.store.write_simple_chapters(target, &chapters).await?;
        info!("✅ Restore complete");
        Ok(chapters)
    }

    fn write_snapshot(&self, path: &Path, chapters: &[Chapter]) -> Result<()> {
        if chapters.is_empty() {
            warn!("⚠️ Refusing to write an empty backup to {}", path.display());
            return Err(RenameError::Configuration("cannot back up an empty chapter list".into()));
        }
        BackupRecord::new(chapters.to_vec())
            .write_to(path)
            .map_err(|e| match e {
                chapter_core::ChapterCoreError::Io(source) => RenameError::io(path, source),
                other => RenameError::Structural(other),
            })?;
        info!("💾 Backup written: {} ({} chapters)", path.display(), chapters.len());
        Ok(())
    }
}
