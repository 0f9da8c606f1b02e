//! Background task draining pty output into an [`OutputBuffer`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::buffer::OutputBuffer;
use crate::transport::PtyTransport;

/// How long the reader waits before polling again after end of stream.
pub(crate) const EOF_BACKOFF: Duration = Duration::from_millis(10);

/// Read from `pty` into `buffer` until `token` is cancelled.
///
/// End of stream is not an error: the reader backs off and keeps polling,
/// since the matcher may still be waiting on its deadline. Any other read
/// error is reported once on `errors` and ends the task.
pub(crate) async fn drain_into<P: PtyTransport>(
    pty: Arc<P>,
    buffer: OutputBuffer,
    token: CancellationToken,
    errors: mpsc::Sender<io::Error>,
    chunk_size: usize,
) {
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        let read = tokio::select! {
            _ = token.cancelled() => return,
            read = pty.read(&mut chunk) => read,
        };

        match read {
            Ok(0) => {
                trace!("pty at end of stream, backing off");
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(EOF_BACKOFF) => {}
                }
            }
            Ok(n) => {
                trace!("read {} bytes from pty", n);
                buffer.append(&chunk[..n]).await;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("error reading from pty: {}", e);
                let _ = errors.send(e).await;
                return;
            }
        }
    }
}
