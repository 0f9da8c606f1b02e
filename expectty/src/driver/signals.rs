//! Signal handling for interact mode.

use std::future::Future;
use std::io;
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::transport::{PtyTransport, WindowSize};

/// Operator-side events that affect an interact session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// The operator's terminal changed size.
    WindowChange,
    /// Stop interacting (SIGINT).
    Interrupt,
    /// Stop interacting (SIGTSTP).
    Suspend,
}

/// Source of [`ControlSignal`]s.
///
/// `None` means the source is exhausted; interact keeps running without it.
pub trait SignalSource: Send {
    fn recv(&mut self) -> impl Future<Output = Option<ControlSignal>> + Send;
}

impl SignalSource for mpsc::Receiver<ControlSignal> {
    async fn recv(&mut self) -> Option<ControlSignal> {
        mpsc::Receiver::recv(self).await
    }
}

impl SignalSource for mpsc::UnboundedReceiver<ControlSignal> {
    async fn recv(&mut self) -> Option<ControlSignal> {
        mpsc::UnboundedReceiver::recv(self).await
    }
}

/// OS signal subscriptions: SIGWINCH, SIGINT and SIGTSTP.
pub struct OsSignals {
    window_change: Signal,
    interrupt: Signal,
    suspend: Signal,
}

impl OsSignals {
    /// Install the handlers. Must be called inside a tokio runtime.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            window_change: signal(SignalKind::window_change())?,
            interrupt: signal(SignalKind::interrupt())?,
            suspend: signal(SignalKind::from_raw(libc::SIGTSTP))?,
        })
    }
}

impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<ControlSignal> {
        tokio::select! {
            Some(()) = self.window_change.recv() => Some(ControlSignal::WindowChange),
            Some(()) = self.interrupt.recv() => Some(ControlSignal::Interrupt),
            Some(()) = self.suspend.recv() => Some(ControlSignal::Suspend),
            else => None,
        }
    }
}

/// Reacts to control signals and worker errors during interact.
pub(crate) struct SignalController<P, F> {
    pty: Arc<P>,
    window_size: F,
}

impl<P, F> SignalController<P, F>
where
    P: PtyTransport,
    F: FnMut() -> io::Result<WindowSize>,
{
    pub(crate) fn new(pty: Arc<P>, window_size: F) -> Self {
        Self { pty, window_size }
    }

    /// Copy the operator's terminal size to the pty. Failures are not fatal.
    pub(crate) fn sync_window_size(&mut self) {
        let result = (self.window_size)().and_then(|size| {
            debug!("resizing pty to {}x{}", size.cols, size.rows);
            self.pty.resize(size)
        });
        if let Err(e) = result {
            warn!("failed to resize pty: {}", e);
        }
    }

    /// Run until a stop signal, a worker error, or external cancellation.
    ///
    /// Returns the first worker error, if any, and the error receiver so the
    /// caller can drain whatever arrives while the workers wind down.
    pub(crate) async fn run<G: SignalSource>(
        mut self,
        mut signals: G,
        mut errors: mpsc::UnboundedReceiver<Error>,
        token: CancellationToken,
    ) -> (Option<Error>, mpsc::UnboundedReceiver<Error>) {
        let mut signals_open = true;

        let failure = loop {
            tokio::select! {
                biased;

                received = errors.recv() => {
                    if let Some(e) = &received {
                        error!("interact: {}", e);
                    }
                    token.cancel();
                    break received;
                }
                _ = token.cancelled() => break None,
                signal = signals.recv(), if signals_open => match signal {
                    Some(ControlSignal::WindowChange) => self.sync_window_size(),
                    Some(stop) => {
                        debug!("received {:?}, leaving interact", stop);
                        token.cancel();
                        break None;
                    }
                    None => {
                        debug!("signal source closed");
                        signals_open = false;
                    }
                },
            }
        };

        (failure, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::transport::mock::{MockHandle, MockPty, MockSpawner};
    use crate::transport::{CommandSpec, ExitStatus, Spawner};

    fn setup() -> (Arc<MockPty>, MockHandle) {
        let spawner = MockSpawner::new();
        let handle = spawner.handle();
        let (pty, _child) = spawner
            .spawn(&CommandSpec::new("mock"), WindowSize::default())
            .unwrap();
        (Arc::new(pty), handle)
    }

    fn fixed_size() -> io::Result<WindowSize> {
        Ok(WindowSize::new(120, 40))
    }

    #[tokio::test]
    async fn test_window_change_resizes_then_interrupt_stops() {
        let (pty, handle) = setup();
        let (signal_tx, signal_rx) = mpsc::channel(4);
        let (_errors_tx, errors_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        signal_tx.send(ControlSignal::WindowChange).await.unwrap();
        signal_tx.send(ControlSignal::Interrupt).await.unwrap();

        let (failure, _) = SignalController::new(pty, fixed_size)
            .run(signal_rx, errors_rx, token.clone())
            .await;

        assert!(failure.is_none());
        assert!(token.is_cancelled());
        assert_eq!(handle.resizes(), vec![WindowSize::new(120, 40)]);
    }

    #[tokio::test]
    async fn test_resize_failure_is_not_fatal() {
        let (pty, handle) = setup();
        handle.fail_resizes(true);
        let (signal_tx, signal_rx) = mpsc::channel(4);
        let (_errors_tx, errors_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        signal_tx.send(ControlSignal::WindowChange).await.unwrap();
        let controller = tokio::spawn(
            SignalController::new(pty, fixed_size).run(signal_rx, errors_rx, token.clone()),
        );

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!controller.is_finished());
        assert!(!token.is_cancelled());

        signal_tx.send(ControlSignal::Suspend).await.unwrap();
        controller.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_first_error_cancels() {
        let (pty, _handle) = setup();
        let (_signal_tx, signal_rx) = mpsc::channel::<ControlSignal>(1);
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        errors_tx
            .send(ProcessError::Exited(ExitStatus::Exited(1)).into())
            .unwrap();
        errors_tx
            .send(ProcessError::Exited(ExitStatus::Exited(2)).into())
            .unwrap();

        let (failure, mut rest) = SignalController::new(pty, fixed_size)
            .run(signal_rx, errors_rx, token.clone())
            .await;

        assert!(token.is_cancelled());
        assert!(matches!(
            failure,
            Some(Error::Process(ProcessError::Exited(ExitStatus::Exited(1))))
        ));
        assert!(rest.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_external_cancellation_stops() {
        let (pty, _handle) = setup();
        let (signal_tx, signal_rx) = mpsc::channel::<ControlSignal>(1);
        let (_errors_tx, errors_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        // An exhausted signal source alone does not stop the controller.
        drop(signal_tx);
        let controller = tokio::spawn(
            SignalController::new(pty, fixed_size).run(signal_rx, errors_rx, token.clone()),
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!controller.is_finished());

        token.cancel();
        let (failure, _) = controller.await.unwrap();
        assert!(failure.is_none());
    }
}
