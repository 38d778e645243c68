//! External process abstraction
//!
//! Every external tool (ffmpeg, mkvextract, mkvpropedit, the fingerprinter)
//! is driven through [`ToolRunner`]: arguments and optional stdin bytes in,
//! exit status plus captured stdout/stderr out. Tests swap in fakes.

use crate::error::ToolError;
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// One external command to run
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program file name, for log and error messages
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Whether any argument equals `needle`
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// Argument following `flag`, if any
    pub fn arg_after(&self, flag: &str) -> Option<&Path> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.args.get(pos + 1).map(Path::new)
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Exit code, `None` when terminated by a signal
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Runs tools as child processes
#[derive(Debug, Clone, Default)]
pub struct SystemToolRunner;

impl SystemToolRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let program = invocation.program_name();
        debug!("⚡ Running {} {:?}", invocation.program.display(), invocation.args);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if invocation.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| {
            error!("❌ Failed to spawn {}: {}", program, source);
            ToolError::Spawn {
                program: program.clone(),
                source,
            }
        })?;

        // Feed stdin from its own task so a full stdout pipe cannot deadlock us
        let feeder = match (invocation.stdin, child.stdin.take()) {
            (Some(bytes), Some(mut pipe)) => Some(tokio::spawn(async move {
                let written = pipe.write_all(&bytes).await;
                drop(pipe);
                written
            })),
            _ => None,
        };

        let start = Instant::now();
        let output = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    // Dropping the wait future drops the child, which kills it
                    warn!("⏰ {} timed out after {:.1}s", program, start.elapsed().as_secs_f64());
                    return Err(ToolError::TimedOut { program, timeout: limit });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|source| ToolError::Io {
            program: program.clone(),
            source,
        })?;

        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Ok(())) => {}
                // A tool may legitimately stop reading early
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("{} closed stdin early", program);
                }
                Ok(Err(source)) => return Err(ToolError::Io { program, source }),
                Err(join) => {
                    return Err(ToolError::Io {
                        program,
                        source: std::io::Error::new(std::io::ErrorKind::Other, join),
                    })
                }
            }
        }

        debug!(
            "{} exited with {:?} in {:.2}s ({} bytes stdout)",
            program,
            output.status.code(),
            start.elapsed().as_secs_f64(),
            output.stdout.len()
        );

        Ok(ToolOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
