//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::WindowSize;

/// Default deadline for expect calls without an explicit timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback tick for re-checking patterns when no wake-up arrives.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(50);

/// Bytes requested from the pty per read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Configuration for session behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Default timeout for expect calls.
    pub timeout: Duration,

    /// Upper bound between pattern checks while waiting for output.
    pub poll_interval: Duration,

    /// Only search the last N bytes of output; `None` searches everything.
    pub search_depth: Option<usize>,

    /// Read chunk size for pty output.
    pub read_buffer_size: usize,

    /// Initial pty dimensions.
    pub window_size: WindowSize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            search_depth: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            window_size: WindowSize::default(),
        }
    }
}

impl SessionConfig {
    /// Check the values a session cannot run with.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.read_buffer_size == 0 {
            return Err("read_buffer_size must be > 0".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be > 0".to_string());
        }
        if self.search_depth == Some(0) {
            return Err("search_depth must be > 0 when set".to_string());
        }
        if self.window_size.cols == 0 || self.window_size.rows == 0 {
            return Err("window_size must be at least 1x1".to_string());
        }
        Ok(())
    }
}
