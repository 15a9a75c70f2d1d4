//! External archive process.
//!
//! The archiver is modelled as a capability: a readable output stream that can
//! be killed and waited on. [`ZipProducer`] runs the real `zip` tool;
//! [`MemoryProducer`](super::MemoryProducer) stands in for it in tests.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use process_utils::{ChildExt, Termination, tokio_command};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default archiver program.
pub const ZIP_PROGRAM: &str = "zip";

/// Recursive zip of the working directory, written to stdout.
pub const ZIP_ARGS: [&str; 3] = ["-r", "-", "."];

/// Lifecycle of an archive process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exited on its own. `None` when no exit code is available.
    Exited(Option<i32>),
    Killed,
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl From<Termination> for ProcessStatus {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::Exited(status) => Self::Exited(status.code()),
            Termination::Killed(_) => Self::Killed,
        }
    }
}

/// A running archiver whose output is consumed as a byte stream.
#[async_trait]
pub trait ArchiveProcess: Send {
    /// The archive bytes as the process writes them.
    fn output(&mut self) -> &mut (dyn AsyncRead + Send + Unpin);

    /// Current status without blocking.
    fn status(&mut self) -> ProcessStatus;

    /// Kill the process if it is still running, then reap it.
    ///
    /// Calling this again after it returned is a no-op that reports the
    /// recorded status.
    async fn stop(&mut self) -> Result<ProcessStatus>;
}

/// Starts archive processes.
#[async_trait]
pub trait ArchiveProducer: Send + Sync {
    /// Start archiving `directory` without waiting for completion.
    async fn start(&self, directory: &Path) -> Result<Box<dyn ArchiveProcess>>;
}

/// Runs an external zip command rooted at the archive directory.
#[derive(Debug, Clone)]
pub struct ZipProducer {
    program: String,
    args: Vec<String>,
}

impl ZipProducer {
    /// `zip -r - .`
    pub fn new() -> Self {
        Self::with_command(ZIP_PROGRAM, ZIP_ARGS)
    }

    /// Use a custom archiver. It must write the archive to stdout.
    pub fn with_command(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for ZipProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArchiveProducer for ZipProducer {
    async fn start(&self, directory: &Path) -> Result<Box<dyn ArchiveProcess>> {
        let mut child = tokio_command(&self.program)
            .args(&self.args)
            .current_dir(directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::launch(&self.program, e))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::Other(format!("Failed to capture {} stdout", self.program))
        })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr, self.program.clone()));
        }

        info!(
            program = %self.program,
            pid = child.id(),
            directory = %directory.display(),
            "Started archiver"
        );

        Ok(Box::new(ZipProcess {
            child,
            stdout,
            status: ProcessStatus::Running,
        }))
    }
}

/// Forward archiver diagnostics to the log. Keeps the stderr pipe from
/// filling up and stalling the child.
async fn drain_stderr(stderr: ChildStderr, program: String) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(program = %program, "{}", line),
            Ok(None) => break,
            Err(e) => {
                warn!(program = %program, error = %e, "Error reading archiver stderr");
                break;
            }
        }
    }
}

struct ZipProcess {
    child: Child,
    stdout: ChildStdout,
    status: ProcessStatus,
}

#[async_trait]
impl ArchiveProcess for ZipProcess {
    fn output(&mut self) -> &mut (dyn AsyncRead + Send + Unpin) {
        &mut self.stdout
    }

    fn status(&mut self) -> ProcessStatus {
        if self.status.is_running()
            && let Ok(Some(exit)) = self.child.try_wait()
        {
            self.status = ProcessStatus::Exited(exit.code());
        }
        self.status
    }

    async fn stop(&mut self) -> Result<ProcessStatus> {
        let termination = self.child.terminate().await?;
        if self.status.is_running() {
            self.status = termination.into();
        }

        match self.status {
            ProcessStatus::Killed => debug!(pid = ?self.child.id(), "Archiver killed and reaped"),
            ProcessStatus::Exited(Some(0)) => {}
            ProcessStatus::Exited(code) => warn!(?code, "Archiver exited with failure"),
            ProcessStatus::Running => {}
        }
        Ok(self.status)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_launch_error_for_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let producer = ZipProducer::with_command("definitely-not-an-archiver", ["-r"]);

        let err = producer.start(dir.path()).await.err().unwrap();
        assert!(
            matches!(err, Error::Launch { ref program, .. } if program == "definitely-not-an-archiver")
        );
    }

    #[tokio::test]
    async fn test_output_and_natural_exit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), b"hello").unwrap();
        let producer = ZipProducer::with_command("cat", ["note.txt"]);

        let mut process = producer.start(dir.path()).await.unwrap();
        let mut out = Vec::new();
        process.output().read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");

        while process.status().is_running() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let status = process.stop().await.unwrap();
        assert_eq!(status, ProcessStatus::Exited(Some(0)));
        // Second stop is a no-op.
        assert_eq!(process.stop().await.unwrap(), status);
    }

    #[tokio::test]
    async fn test_stop_kills_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let producer = ZipProducer::with_command("sleep", ["30"]);

        let mut process = producer.start(dir.path()).await.unwrap();
        assert_eq!(process.status(), ProcessStatus::Running);

        assert_eq!(process.stop().await.unwrap(), ProcessStatus::Killed);
        assert_eq!(process.status(), ProcessStatus::Killed);
    }
}
