//! Command and terminal geometry configuration.

use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SpawnError;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    /// Number of columns.
    pub cols: u16,

    /// Number of rows.
    pub rows: u16,
}

impl WindowSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    pub(crate) fn to_winsize(self) -> libc::winsize {
        libc::winsize {
            ws_row: self.rows,
            ws_col: self.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// The program a session runs, with its arguments and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path, resolved through `PATH`.
    pub program: OsString,

    /// Arguments, not including the program name.
    pub args: Vec<OsString>,

    /// Extra environment variables for the child.
    pub env: Vec<(OsString, OsString)>,

    /// Working directory; inherits the parent's when `None`.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Program name for log and error messages.
    pub fn display_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Reject commands the OS could never exec.
    pub(crate) fn validate(&self) -> Result<(), SpawnError> {
        use std::os::unix::ffi::OsStrExt;

        if self.program.is_empty() {
            return Err(SpawnError::InvalidCommand("program is empty".to_string()));
        }

        let has_nul = std::iter::once(&self.program)
            .chain(self.args.iter())
            .any(|part| part.as_bytes().contains(&0));
        if has_nul {
            return Err(SpawnError::InvalidCommand(
                "argument contains null byte".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size_default() {
        assert_eq!(WindowSize::default(), WindowSize::new(80, 24));
    }

    #[test]
    fn test_validate_rejects_empty_program() {
        let spec = CommandSpec::new("");
        assert!(matches!(spec.validate(), Err(SpawnError::InvalidCommand(_))));
    }

    #[test]
    fn test_validate_rejects_nul_argument() {
        let mut spec = CommandSpec::new("echo");
        spec.args.push(OsString::from("a\0b"));
        assert!(matches!(spec.validate(), Err(SpawnError::InvalidCommand(_))));
    }

    #[test]
    fn test_window_size_serde() {
        let size: WindowSize = serde_json::from_str(r#"{"cols":120,"rows":40}"#).unwrap();
        assert_eq!(size, WindowSize::new(120, 40));
    }
}
