//! Scripted in-memory transport for tests.
//!
//! A [`MockSpawner`] hands out a pty whose output is fed by a [`MockHandle`]
//! and whose input is recorded for inspection, plus a child whose exit is
//! triggered from the same handle.
//!
//! ```rust
//! use expectty::transport::mock::MockSpawner;
//! use expectty::SessionBuilder;
//!
//! # async fn example() -> Result<(), expectty::Error> {
//! let spawner = MockSpawner::new();
//! let handle = spawner.handle();
//!
//! let mut session = SessionBuilder::new("bash").build_with(spawner)?;
//! session.start().await?;
//!
//! handle.push_output("login: ");
//! let matched = session.expect(&regex::bytes::Regex::new("login:").unwrap()).await?;
//! assert!(matched);
//! # Ok(())
//! # }
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};

use super::config::{CommandSpec, WindowSize};
use super::{ChildProcess, ExitStatus, PtyTransport, Spawner};
use crate::error::SpawnError;

#[derive(Debug)]
enum Chunk {
    Data(Vec<u8>),
    Error(io::ErrorKind),
    Eof,
}

#[derive(Debug)]
struct ReadState {
    rx: mpsc::UnboundedReceiver<Chunk>,
    pending: Vec<u8>,
    eof: bool,
}

#[derive(Debug)]
struct Shared {
    output_tx: mpsc::UnboundedSender<Chunk>,
    reader: tokio::sync::Mutex<ReadState>,
    written: Mutex<Vec<u8>>,
    resizes: Mutex<Vec<WindowSize>>,
    spawns: Mutex<Vec<(CommandSpec, WindowSize)>>,
    exit_tx: watch::Sender<Option<ExitStatus>>,
    kills: AtomicUsize,
    fail_spawn: AtomicBool,
    fail_write: AtomicBool,
    fail_resize: AtomicBool,
    fail_try_wait: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawner producing scripted [`MockPty`] / [`MockChild`] pairs.
#[derive(Debug, Clone)]
pub struct MockSpawner {
    shared: Arc<Shared>,
}

impl MockSpawner {
    pub fn new() -> Self {
        let (output_tx, rx) = mpsc::unbounded_channel();
        let (exit_tx, _) = watch::channel(None);

        Self {
            shared: Arc::new(Shared {
                output_tx,
                reader: tokio::sync::Mutex::new(ReadState {
                    rx,
                    pending: Vec::new(),
                    eof: false,
                }),
                written: Mutex::new(Vec::new()),
                resizes: Mutex::new(Vec::new()),
                spawns: Mutex::new(Vec::new()),
                exit_tx,
                kills: AtomicUsize::new(0),
                fail_spawn: AtomicBool::new(false),
                fail_write: AtomicBool::new(false),
                fail_resize: AtomicBool::new(false),
                fail_try_wait: AtomicBool::new(false),
            }),
        }
    }

    /// Handle for scripting and inspecting everything this spawner creates.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: self.shared.clone(),
        }
    }
}

impl Default for MockSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawner for MockSpawner {
    type Pty = MockPty;
    type Child = MockChild;

    fn spawn(
        &self,
        command: &CommandSpec,
        size: WindowSize,
    ) -> Result<(MockPty, MockChild), SpawnError> {
        command.validate()?;

        if self.shared.fail_spawn.load(Ordering::SeqCst) {
            return Err(SpawnError::Os {
                program: command.display_name(),
                source: io::Error::new(io::ErrorKind::NotFound, "mock spawn failure"),
            });
        }

        lock(&self.shared.spawns).push((command.clone(), size));

        Ok((
            MockPty {
                shared: self.shared.clone(),
            },
            MockChild {
                shared: self.shared.clone(),
                exit_rx: self.shared.exit_tx.subscribe(),
            },
        ))
    }
}

/// Test-side control of a mock session.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    /// Queue bytes for the pty to return from its next read.
    pub fn push_output(&self, data: impl AsRef<[u8]>) {
        let _ = self
            .shared
            .output_tx
            .send(Chunk::Data(data.as_ref().to_vec()));
    }

    /// Make the next read fail with the given error kind.
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        let _ = self.shared.output_tx.send(Chunk::Error(kind));
    }

    /// Report end of stream once queued output is drained.
    pub fn close_output(&self) {
        let _ = self.shared.output_tx.send(Chunk::Eof);
    }

    /// Everything written to the pty so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.shared.written).clone()
    }

    /// Every size the pty was resized to, in order.
    pub fn resizes(&self) -> Vec<WindowSize> {
        lock(&self.shared.resizes).clone()
    }

    /// Commands spawned so far with their initial window size.
    pub fn spawns(&self) -> Vec<(CommandSpec, WindowSize)> {
        lock(&self.shared.spawns).clone()
    }

    /// Let the child exit with `status`.
    pub fn exit(&self, status: ExitStatus) {
        self.shared.exit_tx.send_replace(Some(status));
    }

    /// How often the child was killed.
    pub fn kill_count(&self) -> usize {
        self.shared.kills.load(Ordering::SeqCst)
    }

    /// Whether the child has exited (normally or by kill).
    pub fn has_exited(&self) -> bool {
        self.shared.exit_tx.borrow().is_some()
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.shared.fail_spawn.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_write.store(fail, Ordering::SeqCst);
    }

    pub fn fail_resizes(&self, fail: bool) {
        self.shared.fail_resize.store(fail, Ordering::SeqCst);
    }

    pub fn fail_try_waits(&self, fail: bool) {
        self.shared.fail_try_wait.store(fail, Ordering::SeqCst);
    }
}

/// In-memory pty fed by a [`MockHandle`].
#[derive(Debug)]
pub struct MockPty {
    shared: Arc<Shared>,
}

impl PtyTransport for MockPty {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.shared.reader.lock().await;

        if state.pending.is_empty() {
            if state.eof {
                return Ok(0);
            }
            let next = state.rx.recv().await;
            match next {
                Some(Chunk::Data(data)) => state.pending = data,
                Some(Chunk::Error(kind)) => {
                    return Err(io::Error::new(kind, "mock pty read failure"));
                }
                Some(Chunk::Eof) | None => {
                    state.eof = true;
                    return Ok(0);
                }
            }
        }

        let n = buf.len().min(state.pending.len());
        buf[..n].copy_from_slice(&state.pending[..n]);
        state.pending = state.pending.split_off(n);
        Ok(n)
    }

    async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        if self.shared.fail_write.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock pty write failure",
            ));
        }
        lock(&self.shared.written).extend_from_slice(data);
        Ok(())
    }

    fn resize(&self, size: WindowSize) -> io::Result<()> {
        if self.shared.fail_resize.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(libc::ENOTTY));
        }
        lock(&self.shared.resizes).push(size);
        Ok(())
    }
}

/// Child whose lifetime is controlled by a [`MockHandle`].
#[derive(Debug)]
pub struct MockChild {
    shared: Arc<Shared>,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
}

impl ChildProcess for MockChild {
    fn id(&self) -> Option<u32> {
        if self.exit_rx.borrow().is_some() {
            None
        } else {
            Some(4242)
        }
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = *self
            .exit_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mock child dropped"))?;
        Ok(status.unwrap_or(ExitStatus::Exited(-1)))
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.shared.fail_try_wait.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(libc::ECHILD));
        }
        Ok(*self.exit_rx.borrow())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.shared.kills.fetch_add(1, Ordering::SeqCst);
        self.shared.exit_tx.send_if_modified(|status| {
            if status.is_none() {
                *status = Some(ExitStatus::Signaled(libc::SIGKILL));
                true
            } else {
                false
            }
        });
        Ok(())
    }
}
