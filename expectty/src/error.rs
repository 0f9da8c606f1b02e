//! Error types for expectty.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::transport::ExitStatus;

/// Main error type for expectty operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The child process could not be started.
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    /// Reading from or writing to the pty failed.
    #[error("error {context}: {source}")]
    Io {
        /// What the session was doing when the error happened.
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// No expected pattern matched before the deadline.
    #[error("timeout expecting results after {0:?}")]
    Timeout(Duration),

    /// The child process failed or could not be waited on.
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// The session was used in the wrong lifecycle state.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The operator terminal could not be prepared for interact mode.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Invalid configuration in the session builder.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl Error {
    /// Wrap an I/O error with the operation that produced it.
    pub(crate) fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Whether this error is an expect deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors raised while starting the child process.
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The command was empty or contained a NUL byte.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The OS refused to allocate a pty pair.
    #[error("failed to allocate pty: {0}")]
    PtyAllocation(#[source] nix::errno::Errno),

    /// The pty master could not be prepared for async I/O.
    #[error("failed to configure pty: {0}")]
    PtySetup(#[source] io::Error),

    /// The OS spawn itself failed (missing binary, permissions, ...).
    #[error("failed to spawn '{program}': {source}")]
    Os {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Errors describing how the child process ended.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The child ended unsuccessfully.
    #[error("process {0}")]
    Exited(ExitStatus),

    /// Waiting for the child failed.
    #[error("failed to wait for process: {0}")]
    Wait(#[source] io::Error),

    /// Killing the child failed.
    #[error("failed to kill process: {0}")]
    Kill(#[source] io::Error),
}

/// Lifecycle misuse of a [`Session`](crate::Session).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// `start()` has not been called (or failed).
    #[error("session not started - call start() first")]
    NotStarted,

    /// `start()` was called on a session that already ran.
    #[error("session already started")]
    AlreadyStarted,

    /// The session has been closed.
    #[error("session closed")]
    Closed,
}

/// Result type alias using expectty's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_identity() {
        let err = Error::Timeout(Duration::from_millis(100));
        assert!(err.is_timeout());
        assert!(!Error::from(SessionError::Closed).is_timeout());
    }

    #[test]
    fn test_io_error_message() {
        let err = Error::io(
            "reading from pty",
            io::Error::new(io::ErrorKind::BrokenPipe, "gone"),
        );
        assert_eq!(err.to_string(), "error reading from pty: gone");
    }

    #[test]
    fn test_process_error_message() {
        let err = Error::from(ProcessError::Exited(ExitStatus::Exited(2)));
        assert_eq!(err.to_string(), "Process error: process exited with status 2");
    }
}
