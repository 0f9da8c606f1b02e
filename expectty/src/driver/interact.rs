//! Interact mode: hand the child over to the operator's terminal.

use std::io;
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::session::Session;
use super::signals::{OsSignals, SignalController, SignalSource};
use crate::error::{Error, ProcessError, Result};
use crate::terminal::{self, OperatorInput, RawMode};
use crate::transport::{ChildProcess, PtyTransport, Spawner, WindowSize};

type ErrorSender = mpsc::UnboundedSender<Error>;

impl<S: Spawner> Session<S> {
    /// Relay the child to the operator's terminal until it exits or the
    /// operator sends SIGINT/SIGTSTP.
    ///
    /// The terminal is put in raw mode for the duration and window-size
    /// changes are forwarded to the pty. Failures inside the relay do not
    /// fail the call: they are logged, written to the terminal, and kept in
    /// [`interact_log`](Session::interact_log). The child is left running.
    pub async fn interact(&mut self) -> Result<()> {
        self.running()?;

        let signals = OsSignals::new()
            .map_err(|e| Error::Terminal(format!("Failed to install signal handlers: {}", e)))?;
        let _raw = RawMode::enable()?;
        let input = OperatorInput::new()?;

        self.interact_with(input, tokio::io::stdout(), signals, terminal::window_size)
            .await
    }

    /// [`interact`](Self::interact) over caller-provided endpoints.
    ///
    /// `window_size` is queried once up front and again on every
    /// [`WindowChange`](super::ControlSignal::WindowChange).
    pub async fn interact_with<R, W, G, F>(
        &mut self,
        input: R,
        output: W,
        signals: G,
        window_size: F,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        G: SignalSource,
        F: FnMut() -> io::Result<WindowSize> + Send,
    {
        let running = self.running()?;
        let pty = running.pty.clone();
        let child = running.child.clone();
        let chunk_size = self.config().read_buffer_size;

        let token = self.shutdown.child_token();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        let mut controller = SignalController::new(pty.clone(), window_size);
        controller.sync_window_size();

        debug!("entering interact mode");
        let output_task = tokio::spawn(copy_output(
            pty.clone(),
            output,
            token.clone(),
            errors_tx.clone(),
            chunk_size,
        ));
        let input_task = tokio::spawn(copy_input(
            input,
            pty,
            token.clone(),
            errors_tx.clone(),
            chunk_size,
        ));
        let wait_task = tokio::spawn(wait_for_exit(child, token.clone(), errors_tx));

        let (failure, mut errors_rx) = controller.run(signals, errors_rx, token.clone()).await;
        token.cancel();

        let mut log: Vec<String> = failure.iter().map(ToString::to_string).collect();

        let output = match output_task.await {
            Ok(output) => Some(output),
            Err(e) => {
                log.push(format!("output relay failed: {}", e));
                None
            }
        };
        if let Err(e) = input_task.await {
            log.push(format!("input relay failed: {}", e));
        }
        if let Err(e) = wait_task.await {
            log.push(format!("process waiter failed: {}", e));
        }

        while let Ok(e) = errors_rx.try_recv() {
            error!("interact: {}", e);
            log.push(e.to_string());
        }
        debug!("left interact mode with {} logged error(s)", log.len());

        if let Some(mut output) = output {
            if !log.is_empty() {
                if let Err(e) = write_log(&mut output, &log).await {
                    warn!("failed to write interact log: {}", e);
                }
            }
        }

        self.interact_log.extend(log);
        Ok(())
    }
}

async fn write_log<W: AsyncWrite + Unpin>(output: &mut W, log: &[String]) -> io::Result<()> {
    for entry in log {
        output.write_all(format!("\r\nlog: {}", entry).as_bytes()).await?;
    }
    output.write_all(b"\r\n").await?;
    output.flush().await
}

/// Copy pty output to the operator. Returns the writer when done.
async fn copy_output<P, W>(
    pty: Arc<P>,
    mut output: W,
    token: CancellationToken,
    errors: ErrorSender,
    chunk_size: usize,
) -> W
where
    P: PtyTransport,
    W: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        let read = tokio::select! {
            _ = token.cancelled() => break,
            read = pty.read(&mut chunk) => read,
        };

        let n = match read {
            Ok(0) => {
                debug!("pty output closed");
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = errors.send(Error::io("reading from pty", e));
                break;
            }
        };

        let written = async {
            output.write_all(&chunk[..n]).await?;
            output.flush().await
        };
        if let Err(e) = written.await {
            let _ = errors.send(Error::io("writing to operator output", e));
            break;
        }
    }

    output
}

/// Copy operator input to the pty.
async fn copy_input<R, P>(
    mut input: R,
    pty: Arc<P>,
    token: CancellationToken,
    errors: ErrorSender,
    chunk_size: usize,
) where
    R: AsyncRead + Unpin,
    P: PtyTransport,
{
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        let read = tokio::select! {
            _ = token.cancelled() => break,
            read = input.read(&mut chunk) => read,
        };

        let n = match read {
            Ok(0) => {
                debug!("operator input closed");
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = errors.send(Error::io("reading operator input", e));
                break;
            }
        };

        let written = tokio::select! {
            _ = token.cancelled() => break,
            written = pty.write_all(&chunk[..n]) => written,
        };
        if let Err(e) = written {
            let _ = errors.send(Error::io("writing to pty", e));
            break;
        }
    }
}

/// Wait for the child. A clean exit ends interact; anything else is an error.
async fn wait_for_exit<C: ChildProcess>(
    child: Arc<Mutex<C>>,
    token: CancellationToken,
    errors: ErrorSender,
) {
    let mut child = tokio::select! {
        _ = token.cancelled() => return,
        child = child.lock() => child,
    };

    let status = tokio::select! {
        _ = token.cancelled() => return,
        status = child.wait() => status,
    };

    match status {
        Ok(status) if status.success() => {
            debug!("process {}", status);
            token.cancel();
        }
        Ok(status) => {
            let _ = errors.send(ProcessError::Exited(status).into());
        }
        Err(e) => {
            let _ = errors.send(ProcessError::Wait(e).into());
        }
    }
}
