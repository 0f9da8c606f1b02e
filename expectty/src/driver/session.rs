//! A child process running on a pty.

use std::ffi::OsString;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::channel::{ExpectEngine, ExpectMatch, Matcher};
use crate::config::SessionConfig;
use crate::error::{Error, ProcessError, Result, SessionError};
use crate::transport::{ChildProcess, CommandSpec, NativeSpawner, PtyTransport, Spawner, WindowSize};

/// Handles that exist only while the child runs.
pub(super) struct Running<S: Spawner> {
    pub(super) pty: Arc<S::Pty>,
    pub(super) child: Arc<Mutex<S::Child>>,
    pid: Option<u32>,
}

pub(super) enum State<S: Spawner> {
    NotStarted,
    Running(Running<S>),
    Closed,
}

/// An interactive child process attached to a pseudo-terminal.
///
/// A session is started at most once. After [`close`](Self::close) it stays
/// closed; build a new session to run the command again.
///
/// # Example
///
/// ```rust,no_run
/// use expectty::Session;
/// use regex::bytes::Regex;
///
/// # async fn example() -> Result<(), expectty::Error> {
/// let mut session = Session::new("sh", ["-c", "sleep 1; echo ready"]);
/// session.start().await?;
///
/// assert!(session.expect(&Regex::new("ready").unwrap()).await?);
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Session<S: Spawner = NativeSpawner> {
    command: CommandSpec,
    config: SessionConfig,
    spawner: S,
    pub(super) state: State<S>,
    pub(super) shutdown: CancellationToken,
    pub(super) interact_log: Vec<String>,
}

impl Session<NativeSpawner> {
    /// Bind a session to `command` and `args`. Nothing is spawned until
    /// [`start`](Self::start).
    pub fn new<I, A>(command: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        let mut spec = CommandSpec::new(command);
        spec.args = args.into_iter().map(Into::into).collect();
        Self::with_spawner(spec, SessionConfig::default(), NativeSpawner)
    }
}

impl<S: Spawner> Session<S> {
    pub(crate) fn with_spawner(command: CommandSpec, config: SessionConfig, spawner: S) -> Self {
        Self {
            command,
            config,
            spawner,
            state: State::NotStarted,
            shutdown: CancellationToken::new(),
            interact_log: Vec::new(),
        }
    }

    /// Spawn the command on a new pty.
    ///
    /// If spawning fails the session stays not started: `send`, `expect*`,
    /// `resize` and `interact` keep failing with
    /// [`SessionError::NotStarted`], and `start` may be called again, for
    /// example after the missing program was installed.
    pub async fn start(&mut self) -> Result<()> {
        if !matches!(self.state, State::NotStarted) {
            return Err(SessionError::AlreadyStarted.into());
        }

        debug!("starting {}", self.command.display_name());
        let (pty, child) = self.spawner.spawn(&self.command, self.config.window_size)?;
        let pid = child.id();
        debug!("{} running with pid {:?}", self.command.display_name(), pid);

        self.state = State::Running(Running {
            pty: Arc::new(pty),
            child: Arc::new(Mutex::new(child)),
            pid,
        });
        Ok(())
    }

    /// Write raw bytes to the child's input.
    pub async fn send(&self, data: impl AsRef<[u8]>) -> Result<()> {
        let data = data.as_ref();
        trace!("send: {:?}", String::from_utf8_lossy(data));
        self.write(data).await
    }

    /// Write `line` followed by `"\r\n"`.
    pub async fn send_line(&self, line: impl AsRef<[u8]>) -> Result<()> {
        let line = line.as_ref();
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line);
        data.extend_from_slice(b"\r\n");
        self.send(data).await
    }

    /// Like [`send_line`](Self::send_line), but the content is never logged.
    pub async fn send_secret_line(&self, secret: &SecretString) -> Result<()> {
        let secret = secret.expose_secret().as_bytes();
        let mut data = Vec::with_capacity(secret.len() + 2);
        data.extend_from_slice(secret);
        data.extend_from_slice(b"\r\n");
        trace!("send: <secret line>");
        let result = self.write(&data).await;
        data.fill(0);
        result
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        self.running()?
            .pty
            .write_all(data)
            .await
            .map_err(|e| Error::io("writing to pty", e))
    }

    /// Kill the child and release the pty.
    ///
    /// Calling this again, or on a session that never started, is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        self.shutdown.cancel();

        let State::Running(running) = std::mem::replace(&mut self.state, State::Closed) else {
            return Ok(());
        };

        let mut child = running.child.lock().await;
        let checked = match child.try_wait() {
            Ok(Some(status)) => {
                debug!("{} already {}", self.command.display_name(), status);
                return Ok(());
            }
            Ok(None) => Ok(()),
            Err(e) => {
                warn!("failed to check {}: {}", self.command.display_name(), e);
                Err(ProcessError::Wait(e))
            }
        };

        // Kill and reap even when the status check failed.
        debug!("killing {}", self.command.display_name());
        let killed = child.kill().await.map_err(ProcessError::Kill);
        checked.and(killed)?;
        Ok(())
    }

    /// Change the pty dimensions seen by the child.
    pub fn resize(&self, size: WindowSize) -> Result<()> {
        self.running()?
            .pty
            .resize(size)
            .map_err(|e| Error::io("resizing pty", e))
    }

    /// OS process id of the child, while it runs.
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            State::Running(running) => running.pid,
            _ => None,
        }
    }

    /// Whether the child has been started and has not exited yet.
    pub fn is_running(&self) -> bool {
        let State::Running(running) = &self.state else {
            return false;
        };
        match running.child.try_lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            // Held by an interact waiter, which only holds it while the child runs.
            Err(_) => true,
        }
    }

    /// The command this session runs.
    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Errors collected by past interact calls, oldest first.
    pub fn interact_log(&self) -> &[String] {
        &self.interact_log
    }

    /// Wait for `pattern` using the configured timeout.
    pub async fn expect(&mut self, pattern: impl Matcher) -> Result<bool> {
        let timeout = self.config.timeout;
        self.expect_with_timeout(pattern, timeout).await
    }

    /// Wait for `pattern` for at most `timeout`.
    pub async fn expect_with_timeout(
        &mut self,
        pattern: impl Matcher,
        timeout: Duration,
    ) -> Result<bool> {
        let found = self
            .expect_expressions_with_timeout(std::slice::from_ref(&pattern), timeout)
            .await?;
        Ok(found.index() == 0)
    }

    /// Wait for any of `patterns` using the configured timeout.
    pub async fn expect_expressions<M: Matcher>(&mut self, patterns: &[M]) -> Result<ExpectMatch> {
        let timeout = self.config.timeout;
        self.expect_expressions_with_timeout(patterns, timeout).await
    }

    /// Wait for any of `patterns` for at most `timeout`.
    ///
    /// Patterns are tested in list order against everything read during the
    /// call; the first one that matches anywhere wins, regardless of where
    /// in the output it matched.
    pub async fn expect_expressions_with_timeout<M: Matcher>(
        &mut self,
        patterns: &[M],
        timeout: Duration,
    ) -> Result<ExpectMatch> {
        let pty = self.running()?.pty.clone();
        ExpectEngine::new(pty, &self.shutdown, &self.config)
            .run(patterns, timeout)
            .await
    }

    pub(super) fn running(&self) -> Result<&Running<S>> {
        match &self.state {
            State::Running(running) => Ok(running),
            State::NotStarted => Err(SessionError::NotStarted.into()),
            State::Closed => Err(SessionError::Closed.into()),
        }
    }
}

impl<S: Spawner> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::NotStarted => "not started",
            State::Running(_) => "running",
            State::Closed => "closed",
        };
        f.debug_struct("Session")
            .field("command", &self.command)
            .field("config", &self.config)
            .field("state", &state)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

impl<S: Spawner> Drop for Session<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let State::Running(running) = &self.state {
            // Dropping the last child handle kills the process.
            warn!(
                "session for {} (pid {:?}) dropped without close()",
                self.command.display_name(),
                running.pid
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use regex::bytes::Regex;

    use super::*;
    use crate::channel::Literal;
    use crate::transport::ExitStatus;
    use crate::transport::mock::{MockHandle, MockSpawner};

    fn mock_session() -> (Session<MockSpawner>, MockHandle) {
        let spawner = MockSpawner::new();
        let handle = spawner.handle();
        let session = Session::with_spawner(
            CommandSpec::new("bash"),
            SessionConfig::default(),
            spawner,
        );
        (session, handle)
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (mut session, handle) = mock_session();
        assert!(!session.is_running());
        assert_eq!(session.pid(), None);

        session.start().await.unwrap();
        assert!(session.is_running());
        assert_eq!(session.pid(), Some(4242));
        assert_eq!(handle.spawns().len(), 1);

        session.close().await.unwrap();
        assert!(!session.is_running());
        assert_eq!(handle.kill_count(), 1);
        assert!(handle.has_exited());
    }

    #[tokio::test]
    async fn test_start_twice() {
        let (mut session, _handle) = mock_session();
        session.start().await.unwrap();
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_failed_start_leaves_session_unstarted() {
        let (mut session, handle) = mock_session();
        handle.fail_spawns(true);
        assert!(matches!(session.start().await, Err(Error::Spawn(_))));

        let err = session.send("ls").await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::NotStarted)));

        handle.fail_spawns(false);
        session.start().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_line_appends_crlf() {
        let (mut session, handle) = mock_session();
        session.start().await.unwrap();

        session.send("a").await.unwrap();
        session.send_line("echo hi").await.unwrap();
        session
            .send_secret_line(&SecretString::from("hunter2"))
            .await
            .unwrap();

        assert_eq!(handle.written(), b"aecho hi\r\nhunter2\r\n");
    }

    #[tokio::test]
    async fn test_send_write_failure() {
        let (mut session, handle) = mock_session();
        session.start().await.unwrap();
        handle.fail_writes(true);

        let err = session.send_line("x").await.unwrap_err();
        assert!(matches!(err, Error::Io { context: "writing to pty", .. }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut session, handle) = mock_session();
        session.close().await.unwrap();
        assert_eq!(handle.kill_count(), 0);

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::AlreadyStarted)));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_kills_when_status_check_fails() {
        let (mut session, handle) = mock_session();
        session.start().await.unwrap();
        handle.fail_try_waits(true);

        let err = session.close().await.unwrap_err();
        assert!(matches!(err, Error::Process(ProcessError::Wait(_))));
        assert_eq!(handle.kill_count(), 1);
        assert!(handle.has_exited());

        session.close().await.unwrap();
        assert_eq!(handle.kill_count(), 1);
    }

    #[tokio::test]
    async fn test_expect_with_unbounded_timeout() {
        let (mut session, handle) = mock_session();
        session.start().await.unwrap();
        handle.push_output("ready");

        assert!(
            session
                .expect_with_timeout(Literal::new("ready"), Duration::MAX)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_close_after_exit_does_not_kill() {
        let (mut session, handle) = mock_session();
        session.start().await.unwrap();
        handle.exit(ExitStatus::Exited(0));
        assert!(!session.is_running());

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(handle.kill_count(), 0);

        let err = session.send("x").await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_expect_forms() {
        let (mut session, handle) = mock_session();
        session.start().await.unwrap();

        handle.push_output("login: ");
        assert!(session.expect(Literal::new("login:")).await.unwrap());

        handle.push_output("barfoo");
        let found = session
            .expect_expressions(&[Regex::new("foo").unwrap(), Regex::new("bar").unwrap()])
            .await
            .unwrap();
        assert_eq!(found.index(), 0);

        let err = session
            .expect_with_timeout(&Regex::new("never").unwrap(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_expect_before_start() {
        let (mut session, _handle) = mock_session();
        let err = session.expect(Literal::new("x")).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::NotStarted)));
    }

    #[tokio::test]
    async fn test_resize() {
        let (mut session, handle) = mock_session();
        session.start().await.unwrap();
        session.resize(WindowSize::new(100, 30)).unwrap();
        assert_eq!(handle.resizes(), vec![WindowSize::new(100, 30)]);
    }
}
