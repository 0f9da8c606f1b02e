//! Expect loop: wait for pty output to match one of several patterns.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::buffer::OutputBuffer;
use super::patterns::{Matcher, first_match};
use super::reader::drain_into;
use crate::config::SessionConfig;
use crate::error::{Error, Result, SessionError};
use crate::transport::PtyTransport;

/// Result of a successful expect call.
#[derive(Debug, Clone)]
pub struct ExpectMatch {
    index: usize,
    range: Range<usize>,
    output: Bytes,
    elapsed: Duration,
}

impl ExpectMatch {
    /// Position of the matching pattern in the list that was passed in.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte range of the match within [`output`](Self::output).
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// The matched bytes.
    pub fn matched(&self) -> &[u8] {
        &self.output[self.range.clone()]
    }

    /// Output received before the match.
    pub fn before(&self) -> &[u8] {
        &self.output[..self.range.start]
    }

    /// Everything read during the call, including bytes after the match.
    pub fn output(&self) -> &Bytes {
        &self.output
    }

    /// Time from the start of the call to the match.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Get the output as a string (lossy UTF-8).
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

/// One expect call against a pty.
///
/// Each call gets its own buffer and reader task. The reader is stopped and
/// awaited before [`run`](Self::run) returns, so a finished call never
/// consumes output meant for the next one.
pub(crate) struct ExpectEngine<P> {
    pty: Arc<P>,
    token: CancellationToken,
    poll_interval: Duration,
    search_depth: Option<usize>,
    read_buffer_size: usize,
}

impl<P: PtyTransport> ExpectEngine<P> {
    pub(crate) fn new(pty: Arc<P>, parent: &CancellationToken, config: &SessionConfig) -> Self {
        Self {
            pty,
            token: parent.child_token(),
            poll_interval: config.poll_interval,
            search_depth: config.search_depth,
            read_buffer_size: config.read_buffer_size,
        }
    }

    /// Wait until any of `patterns` matches, the deadline passes, or reading fails.
    pub(crate) async fn run<M: Matcher>(
        self,
        patterns: &[M],
        timeout: Duration,
    ) -> Result<ExpectMatch> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout).unwrap_or_else(far_future);

        let buffer = OutputBuffer::new();
        let (errors_tx, mut errors_rx) = mpsc::channel(1);
        let reader = tokio::spawn(drain_into(
            self.pty.clone(),
            buffer.clone(),
            self.token.clone(),
            errors_tx,
            self.read_buffer_size,
        ));

        debug!(
            "expecting {} pattern(s) with timeout {:?}",
            patterns.len(),
            timeout
        );

        let mut checked = None;
        let result = loop {
            let snapshot = buffer.snapshot().await;
            if checked != Some(snapshot.generation) {
                checked = Some(snapshot.generation);
                if let Some((index, range)) = self.search(patterns, &snapshot.data) {
                    trace!("pattern {} matched at {:?}", index, range);
                    break Ok(ExpectMatch {
                        index,
                        range,
                        output: snapshot.data,
                        elapsed: started.elapsed(),
                    });
                }
            }

            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(deadline) => {
                    debug!("expect timed out after {:?}", timeout);
                    break Err(Error::Timeout(timeout));
                }
                Some(e) = errors_rx.recv() => {
                    break Err(Error::io("reading from pty", e));
                }
                _ = self.token.cancelled() => {
                    break Err(SessionError::Closed.into());
                }
                _ = buffer.appended() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        };

        self.token.cancel();
        if let Err(e) = reader.await {
            warn!("pty reader task failed: {}", e);
        }

        result
    }

    fn search<M: Matcher>(&self, patterns: &[M], data: &[u8]) -> Option<(usize, Range<usize>)> {
        let offset = match self.search_depth {
            Some(depth) => data.len().saturating_sub(depth),
            None => 0,
        };
        first_match(patterns, &data[offset..])
            .map(|(index, range)| (index, range.start + offset..range.end + offset))
    }
}

/// Stand-in deadline for timeouts too large to add to an `Instant`.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}
