//! Platform process adapter.
//!
//! Everything the session needs from the OS sits behind three traits so a
//! session can run against a real pty ([`NativeSpawner`]) or a scripted one
//! ([`mock::MockSpawner`]).

pub mod config;
pub mod mock;
mod native;

use std::fmt;
use std::future::Future;
use std::io;

pub use config::{CommandSpec, WindowSize};
pub use native::{NativeChild, NativePty, NativeSpawner};

use crate::error::SpawnError;

/// Byte-level access to the controller side of a pty.
///
/// Implementations must be cancel-safe: dropping a pending `read` or
/// `write_all` future must not lose bytes that were already consumed.
pub trait PtyTransport: Send + Sync + 'static {
    /// Read whatever output is available, waiting until at least one byte is.
    ///
    /// `Ok(0)` means end of stream (the child side closed).
    fn read(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Write all of `data` to the child's input.
    fn write_all(&self, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Change the terminal dimensions seen by the child.
    fn resize(&self, size: WindowSize) -> io::Result<()>;
}

/// Handle to the spawned child process.
///
/// Dropping a handle whose process still runs should kill it.
pub trait ChildProcess: Send + 'static {
    /// OS process id, if the child still has one.
    fn id(&self) -> Option<u32>;

    /// Wait for the child to exit and reap it.
    fn wait(&mut self) -> impl Future<Output = io::Result<ExitStatus>> + Send;

    /// Check for exit without blocking.
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Kill the child and reap it.
    fn kill(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Starts a command attached to a fresh pty.
pub trait Spawner: Send + Sync + 'static {
    type Pty: PtyTransport;
    type Child: ChildProcess;

    /// Spawn `command` on a new pty of the given size.
    fn spawn(
        &self,
        command: &CommandSpec,
        size: WindowSize,
    ) -> Result<(Self::Pty, Self::Child), SpawnError>;
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited normally with the given code.
    Exited(i32),
    /// Terminated by the given signal number.
    Signaled(i32),
}

impl ExitStatus {
    /// Returns `true` for a zero exit code.
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// The exit code, if the process exited normally.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Signaled(_) => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Signaled(signal) => write!(f, "killed by signal {signal}"),
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Exited(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status() {
        assert!(ExitStatus::Exited(0).success());
        assert!(!ExitStatus::Exited(1).success());
        assert!(!ExitStatus::Signaled(9).success());
        assert_eq!(ExitStatus::Exited(3).code(), Some(3));
        assert_eq!(ExitStatus::Signaled(9).code(), None);
        assert_eq!(ExitStatus::Signaled(9).to_string(), "killed by signal 9");
    }

    #[test]
    fn test_from_std_exit_status() {
        use std::os::unix::process::ExitStatusExt;

        let status = std::process::ExitStatus::from_raw(2 << 8);
        assert_eq!(ExitStatus::from(status), ExitStatus::Exited(2));

        let status = std::process::ExitStatus::from_raw(libc::SIGKILL);
        assert_eq!(ExitStatus::from(status), ExitStatus::Signaled(libc::SIGKILL));
    }
}
