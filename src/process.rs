//! Scoped execution of external conversion tools.
//!
//! Every external binary (docling, pandoc, wkhtmltopdf) goes through
//! [`run_tool`]: the child is spawned with `kill_on_drop`, waited on under a
//! timeout, and its stderr is captured for the error message. If the timeout
//! fires or the calling future is dropped, the child is killed.
//!
//! [`OutputGuard`] complements this for the file side: a step creates a guard
//! for its output path and only `commit`s it after the file is verified, so an
//! aborted step never leaves a half-written artifact behind.

use crate::error::ConvertError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Longest stderr excerpt carried in a [`ConvertError::ToolFailed`].
const MAX_STDERR_CHARS: usize = 2000;

/// Captured output of a successful tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Run `program` with `args`, failing if it is missing, exits non-zero, or
/// outlives `timeout`.
pub async fn run_tool<I, S>(
    tool: &str,
    program: &Path,
    args: I,
    timeout: Duration,
) -> Result<ToolOutput, ConvertError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Spawning {}: {:?}", tool, cmd.as_std());

    let child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConvertError::ToolNotFound {
            tool: tool.to_string(),
            program: program.to_path_buf(),
        },
        _ => ConvertError::io(program, e),
    })?;

    let start = Instant::now();
    // `wait_with_output` owns the child; when the timeout drops the future,
    // the child is dropped with it and `kill_on_drop` terminates the process.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ConvertError::io(program, e))?,
        Err(_) => {
            warn!("{} exceeded {}s, killing it", tool, timeout.as_secs());
            return Err(ConvertError::ToolTimeout {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };
    let duration = start.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ConvertError::ToolFailed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: truncate(stderr.trim(), MAX_STDERR_CHARS),
        });
    }

    debug!("{} finished in {}ms", tool, duration.as_millis());
    Ok(ToolOutput {
        stdout,
        stderr,
        duration,
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Deletes `path` on drop unless [`OutputGuard::commit`] was called.
#[derive(Debug)]
pub struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file and hand back its path.
    pub fn commit(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!("Removed partial output {}", self.path.display()),
                Err(e) => warn!("Could not remove partial output {}: {}", self.path.display(), e),
            }
        }
    }
}
