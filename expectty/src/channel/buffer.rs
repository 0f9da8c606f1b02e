//! Shared output buffer for a single expect call.
//!
//! One reader task appends, the matcher snapshots. The buffer keeps a
//! generation counter so the matcher can skip re-scanning unchanged output,
//! and wakes the matcher on every append instead of relying on a timer.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Notify, RwLock};

#[derive(Debug, Default)]
struct Contents {
    data: Vec<u8>,
    generation: u64,
}

#[derive(Debug, Default)]
struct Shared {
    contents: RwLock<Contents>,
    appended: Notify,
}

/// Append-only byte buffer shared between a reader and a matcher.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputBuffer {
    shared: Arc<Shared>,
}

/// A consistent copy of the buffer at one generation.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) data: Bytes,
    pub(crate) generation: u64,
}

impl OutputBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append bytes, holding the write lock only for the copy.
    pub(crate) async fn append(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        {
            let mut contents = self.shared.contents.write().await;
            contents.data.extend_from_slice(data);
            contents.generation += 1;
        }
        self.shared.appended.notify_one();
    }

    /// Copy out the current contents under the shared lock.
    pub(crate) async fn snapshot(&self) -> Snapshot {
        let contents = self.shared.contents.read().await;
        Snapshot {
            data: Bytes::copy_from_slice(&contents.data),
            generation: contents.generation,
        }
    }

    /// Resolve after the next append.
    ///
    /// An append that happened since the last call is not lost: it leaves a
    /// stored permit and this returns immediately.
    pub(crate) async fn appended(&self) {
        self.shared.appended.notified().await;
    }
}
