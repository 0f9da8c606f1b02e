//! # expectty
//!
//! Async expect/interact automation for programs that want a terminal.
//!
//! expectty spawns a child process on a pseudo-terminal and lets you drive
//! it the way a person at a keyboard would: send input, wait for output to
//! match a pattern, or hand the terminal over to the operator entirely.
//!
//! ## Features
//!
//! - Async pty I/O on tokio, readiness driven and cancellable
//! - Multi-pattern expect with list-order priority and a hard deadline
//! - Regex (bytes) and literal matchers, or bring your own [`Matcher`]
//! - Interact mode with raw terminal, window-size forwarding and signal handling
//! - Injectable process adapter with an in-memory mock for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use expectty::SessionBuilder;
//! use regex::bytes::Regex;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), expectty::Error> {
//!     let mut session = SessionBuilder::new("sh")
//!         .timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     session.start().await?;
//!     session.send_line("echo hello").await?;
//!
//!     let found = session
//!         .expect_expressions(&[Regex::new("hello").unwrap(), Regex::new("error").unwrap()])
//!         .await?;
//!     println!("matched pattern {}: {}", found.index(), found.as_str_lossy());
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod terminal;
pub mod transport;

// Re-export main types for convenience
pub use channel::{ExpectMatch, Literal, Matcher};
pub use config::{DEFAULT_POLL_INTERVAL, DEFAULT_READ_BUFFER_SIZE, DEFAULT_TIMEOUT, SessionConfig};
pub use driver::{ControlSignal, OsSignals, Session, SessionBuilder, SignalSource};
pub use error::{Error, ProcessError, Result, SessionError, SpawnError};
pub use transport::{CommandSpec, ExitStatus, WindowSize};
