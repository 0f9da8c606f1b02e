//! High-level session API.
//!
//! A [`Session`] owns one child process on a pty. It can be scripted with
//! `send`/`expect`, or handed to a human with `interact`.

mod builder;
mod interact;
mod session;
mod signals;

pub use builder::SessionBuilder;
pub use session::Session;
pub use signals::{ControlSignal, OsSignals, SignalSource};
