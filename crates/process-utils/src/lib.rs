//! Small process-related helpers shared across the workspace.
//!
//! Spawning goes through [`tokio_command`] so every child gets the same
//! platform flags, and teardown goes through [`ChildExt::terminate`] so every
//! child is killed and reaped the same way.

use std::ffi::OsStr;
use std::io;
use std::process::ExitStatus;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
///
/// The child is killed if its handle is dropped without being reaped.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}

/// How a child process ended after [`ChildExt::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child had already exited on its own.
    Exited(ExitStatus),
    /// The child was still running and got killed.
    Killed(ExitStatus),
}

impl Termination {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::Exited(status) | Self::Killed(status) => *status,
        }
    }

    pub fn was_killed(&self) -> bool {
        matches!(self, Self::Killed(_))
    }
}

/// Teardown helpers for tokio child processes.
pub trait ChildExt {
    /// Kill the child if it is still running, then wait for it to be reaped.
    ///
    /// Safe to call after the child exited naturally; in that case it only
    /// collects the exit status.
    fn terminate(&mut self) -> impl Future<Output = io::Result<Termination>> + Send;
}

impl ChildExt for tokio::process::Child {
    async fn terminate(&mut self) -> io::Result<Termination> {
        if let Some(status) = self.try_wait()? {
            return Ok(Termination::Exited(status));
        }

        match self.start_kill() {
            Ok(()) => {}
            // Exited between `try_wait` and the kill signal.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                return self.wait().await.map(Termination::Exited);
            }
            Err(e) => return Err(e),
        }

        self.wait().await.map(Termination::Killed)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[tokio::test]
    async fn terminate_kills_running_child() {
        let mut child = tokio_command("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();

        let termination = child.terminate().await.unwrap();
        assert!(termination.was_killed());
        assert!(!termination.exit_status().success());
    }

    #[tokio::test]
    async fn terminate_after_exit_only_reaps() {
        let mut child = tokio_command("true").spawn().unwrap();
        child.wait().await.unwrap();

        let termination = child.terminate().await.unwrap();
        assert_eq!(termination, Termination::Exited(termination.exit_status()));
        assert!(termination.exit_status().success());
    }
}
