//! Builder for creating sessions.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use super::session::Session;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::transport::{CommandSpec, NativeSpawner, Spawner, WindowSize};

/// Builder for constructing sessions.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use expectty::SessionBuilder;
///
/// # async fn example() -> Result<(), expectty::Error> {
/// let mut session = SessionBuilder::new("ssh")
///     .args(["-tt", "admin@192.168.1.1"])
///     .env("TERM", "vt100")
///     .timeout(Duration::from_secs(10))
///     .build()?;
///
/// session.start().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    command: CommandSpec,
    config: SessionConfig,
}

impl SessionBuilder {
    /// Create a new builder for `program`.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            command: CommandSpec::new(program),
            config: SessionConfig::default(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.command.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.command.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.command.env.push((key.into(), value.into()));
        self
    }

    /// Set the child's working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.command.cwd = Some(dir.into());
        self
    }

    /// Set the default expect timeout (default: 30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the fallback interval between pattern checks (default: 50µs).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Only match against the last `depth` bytes of output.
    pub fn search_depth(mut self, depth: usize) -> Self {
        self.config.search_depth = Some(depth);
        self
    }

    /// Set the initial terminal dimensions (default: 80x24).
    pub fn window_size(mut self, cols: u16, rows: u16) -> Self {
        self.config.window_size = WindowSize::new(cols, rows);
        self
    }

    /// Set the pty read chunk size (default: 4096).
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a session on a real pty.
    ///
    /// This creates the session but does not spawn anything. Call `start()`
    /// on the returned session to run the command.
    pub fn build(self) -> Result<Session<NativeSpawner>> {
        self.build_with(NativeSpawner)
    }

    /// Build a session that spawns through `spawner`.
    pub fn build_with<S: Spawner>(self, spawner: S) -> Result<Session<S>> {
        self.config
            .validate()
            .map_err(|message| Error::InvalidConfig { message })?;
        self.command.validate()?;

        Ok(Session::with_spawner(self.command, self.config, spawner))
    }
}
