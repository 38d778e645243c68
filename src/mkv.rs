//! Pull and push chapter documents through mkvextract / mkvpropedit.
//!
//! Every document passes through a scoped temporary file that is removed on
//! all exit paths when its guard drops.

use crate::config::ToolPaths;
use crate::error::{RenameError, Result};
use crate::tools::{ToolInvocation, ToolRunner};
use chapter_core::{simple, xml, Chapter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, info};

/// Chapter access for Matroska containers
#[derive(Clone)]
pub struct ChapterStore {
    runner: Arc<dyn ToolRunner>,
    mkvextract: PathBuf,
    mkvpropedit: PathBuf,
}

impl ChapterStore {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: &ToolPaths) -> Self {
        Self {
            runner,
            mkvextract: tools.mkvextract.clone(),
            mkvpropedit: tools.mkvpropedit.clone(),
        }
    }

    /// Read the container's chapters. A container without chapters yields an empty list.
    pub async fn read_chapters(&self, container: &Path) -> Result<Vec<Chapter>> {
        let tmp = scratch_file(".xml")?;

        let invocation = ToolInvocation::new(&self.mkvextract)
            .arg(container)
            .arg("chapters")
            .arg(&*tmp);
        self.run_checked(invocation).await?;

        let document = tokio::fs::read_to_string(&*tmp)
            .await
            .map_err(|e| RenameError::io(tmp.to_path_buf(), e))?;
        if document.trim().is_empty() {
            debug!("mkvextract wrote no chapter document for {}", container.display());
            return Ok(Vec::new());
        }

        let chapters = xml::decode(&document).map_err(RenameError::Structural)?;
        debug!("📖 Read {} chapters from {}", chapters.len(), container.display());
        Ok(chapters)
    }

    /// Replace the chapters of `target` with `chapters` (XML form)
    pub async fn write_chapters(&self, target: &Path, chapters: &[Chapter]) -> Result<()> {
        let document = xml::encode(chapters).map_err(RenameError::Structural)?;
        self.push_document(target, ".xml", document).await?;
        info!("✏️ Wrote {} chapters to {}", chapters.len(), target.display());
        Ok(())
    }

    /// Replace the chapters of `target` through the simple line format
    pub async fn write_simple_chapters(&self, target: &Path, chapters: &[Chapter]) -> Result<()> {
        self.push_document(target, ".txt", simple::encode(chapters)).await?;
        info!("✏️ Wrote {} chapters to {} (simple format)", chapters.len(), target.display());
        Ok(())
    }

    async fn push_document(&self, target: &Path, suffix: &str, document: String) -> Result<()> {
        let tmp = scratch_file(suffix)?;
        tokio::fs::write(&*tmp, document)
            .await
            .map_err(|e| RenameError::io(tmp.to_path_buf(), e))?;

        let invocation = ToolInvocation::new(&self.mkvpropedit)
            .arg(target)
            .arg("--chapters")
            .arg(&*tmp);
        self.run_checked(invocation).await
    }

    async fn run_checked(&self, invocation: ToolInvocation) -> Result<()> {
        let tool = invocation.program_name();
        let output = self
            .runner
            .run(invocation)
            .await
            .map_err(|e| RenameError::tool(&tool, e.to_string()))?;

        if !output.success() {
            return Err(RenameError::tool(
                &tool,
                format!("exit status {:?}: {}", output.status, output.stderr_text()),
            ));
        }
        Ok(())
    }
}

/// Make sure `output` exists before editing it: copy `source` over when they differ
pub async fn prepare_output(source: &Path, output: &Path) -> Result<()> {
    if source == output || tokio::fs::try_exists(output).await.unwrap_or(false) {
        return Ok(());
    }
    info!("📋 Copying {} to {}", source.display(), output.display());
    tokio::fs::copy(source, output)
        .await
        .map_err(|e| RenameError::io(output, e))?;
    Ok(())
}

fn scratch_file(suffix: &str) -> Result<TempPath> {
    let file = tempfile::Builder::new()
        .prefix("mkv-chapters-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| RenameError::io(std::env::temp_dir(), e))?;
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::ToolOutput;
    use async_trait::async_trait;
    use chapter_core::ChapterTime;
    use std::sync::Mutex;

    /// Serves a fixed document for mkvextract and records mkvpropedit inputs
    struct FakeMkvTools {
        document: String,
        exit: i32,
        written: Mutex<Vec<(String, String)>>,
        scratch: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl ToolRunner for FakeMkvTools {
        async fn run(&self, invocation: ToolInvocation) -> std::result::Result<ToolOutput, ToolError> {
            if invocation.has_arg("chapters") {
                let out = invocation.arg_after("chapters").unwrap().to_path_buf();
                std::fs::write(&out, &self.document).unwrap();
                self.scratch.lock().unwrap().push(out);
            } else if let Some(input) = invocation.arg_after("--chapters") {
                let body = std::fs::read_to_string(input).unwrap();
                let target = invocation.args[0].to_string_lossy().into_owned();
                self.written.lock().unwrap().push((target, body));
                self.scratch.lock().unwrap().push(input.to_path_buf());
            }
            Ok(ToolOutput { status: Some(self.exit), stdout: Vec::new(), stderr: b"boom".to_vec() })
        }
    }

    fn fake(document: &str, exit: i32) -> Arc<FakeMkvTools> {
        Arc::new(FakeMkvTools {
            document: document.to_string(),
            exit,
            written: Mutex::new(Vec::new()),
            scratch: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_read_and_write_remove_scratch_files() {
        let chapters = vec![Chapter::new("7", ChapterTime::from_millis(1_000), None, "Song")];
        let tools = fake(&xml::encode(&chapters).unwrap(), 0);
        let store = ChapterStore::new(tools.clone(), &ToolPaths::default());

        let read = store.read_chapters(Path::new("a.mkv")).await.unwrap();
        assert_eq!(read, chapters);

        store.write_chapters(Path::new("b.mkv"), &read).await.unwrap();
        store.write_simple_chapters(Path::new("b.mkv"), &read).await.unwrap();

        let written = tools.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].0, "b.mkv");
        assert!(written[0].1.contains("<ChapterString>Song</ChapterString>"));
        assert_eq!(written[1].1, "CHAPTER01=00:00:01.000\nCHAPTER01NAME=Song\n");

        for path in tools.scratch.lock().unwrap().iter() {
            assert!(!path.exists(), "{} left behind", path.display());
        }
    }

    #[tokio::test]
    async fn test_failures_are_reported() {
        let store = ChapterStore::new(fake("", 2), &ToolPaths::default());
        assert!(matches!(
            store.read_chapters(Path::new("a.mkv")).await,
            Err(RenameError::ToolInvocation { .. })
        ));

        let tools = fake("<Chapters><EditionEntry>", 0);
        let store = ChapterStore::new(tools.clone(), &ToolPaths::default());
        assert!(matches!(
            store.read_chapters(Path::new("a.mkv")).await,
            Err(RenameError::Structural(_))
        ));
        assert!(!tools.scratch.lock().unwrap()[0].exists());
    }

    #[tokio::test]
    async fn test_empty_document_means_no_chapters() {
        let store = ChapterStore::new(fake("", 0), &ToolPaths::default());
        assert!(store.read_chapters(Path::new("a.mkv")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_output_copies_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("in.mkv");
        let output = dir.path().join("out.mkv");
        std::fs::write(&source, b"matroska").unwrap();

        prepare_output(&source, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"matroska");

        std::fs::write(&output, b"edited").unwrap();
        prepare_output(&source, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"edited");
    }
}
