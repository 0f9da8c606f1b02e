//! Channel layer: pattern matching over pty output.
//!
//! Every expect call drains the pty into a fresh buffer from a short-lived
//! reader task and matches against it until a pattern hits or time runs out.

mod buffer;
mod expect;
mod patterns;
mod reader;

pub use expect::ExpectMatch;
pub use patterns::{Literal, Matcher};

pub(crate) use expect::ExpectEngine;
