//! The operator's controlling terminal, used by interact mode.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use log::{debug, warn};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{Error, Result};
use crate::transport::WindowSize;

const STDIN: RawFd = libc::STDIN_FILENO;

fn stdin_fd() -> BorrowedFd<'static> {
    // SAFETY: fd 0 stays open for the life of the process.
    unsafe { BorrowedFd::borrow_raw(STDIN) }
}

/// Current size of the terminal attached to stdin.
pub fn window_size() -> io::Result<WindowSize> {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes a winsize into the pointer we pass.
    if unsafe { libc::ioctl(STDIN, libc::TIOCGWINSZ as _, &mut ws) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(WindowSize::new(ws.ws_col, ws.ws_row))
}

/// Puts stdin into raw mode, restoring the saved attributes on drop.
pub struct RawMode {
    original: Termios,
}

impl RawMode {
    pub fn enable() -> Result<Self> {
        let stdin = stdin_fd();
        let original = termios::tcgetattr(stdin).map_err(|e| {
            Error::Terminal(format!("Failed to get terminal attributes: {}", e))
        })?;

        let raw = raw_attributes(&original);
        termios::tcsetattr(stdin, SetArg::TCSANOW, &raw)
            .map_err(|e| Error::Terminal(format!("Failed to set raw mode: {}", e)))?;

        debug!("operator terminal in raw mode");
        Ok(Self { original })
    }
}

/// Raw mode that still turns Ctrl-C and Ctrl-Z into SIGINT and SIGTSTP.
///
/// The signals go to this process's foreground group only; the child runs
/// in its own session on the pty and never sees them.
fn raw_attributes(original: &Termios) -> Termios {
    let mut raw = original.clone();
    termios::cfmakeraw(&mut raw);
    raw.local_flags.insert(LocalFlags::ISIG);
    raw
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(stdin_fd(), SetArg::TCSANOW, &self.original) {
            warn!("failed to restore terminal: {}", e);
        }
    }
}

/// Non-blocking async reader over the process's stdin.
///
/// Unlike `tokio::io::stdin()`, a pending read can be dropped without
/// leaving a blocked thread behind, so interact mode returns promptly.
/// The original file status flags are restored on drop.
pub struct OperatorInput {
    fd: AsyncFd<RawFd>,
    flags: libc::c_int,
}

impl OperatorInput {
    pub fn new() -> Result<Self> {
        // SAFETY: fcntl F_GETFL on fd 0, which is always open; no memory is passed.
        let flags = unsafe { libc::fcntl(STDIN, libc::F_GETFL) };
        if flags < 0 {
            return Err(Error::Terminal(format!(
                "Failed to get stdin flags: {}",
                io::Error::last_os_error()
            )));
        }
        // SAFETY: as above; only the status flags of fd 0 change.
        if unsafe { libc::fcntl(STDIN, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            return Err(Error::Terminal(format!(
                "Failed to set stdin non-blocking: {}",
                io::Error::last_os_error()
            )));
        }

        match AsyncFd::new(STDIN) {
            Ok(fd) => Ok(Self { fd, flags }),
            Err(e) => {
                // SAFETY: puts back the flags read above.
                unsafe { libc::fcntl(STDIN, libc::F_SETFL, flags) };
                Err(Error::Terminal(format!("Failed to register stdin: {}", e)))
            }
        }
    }
}

impl AsyncRead for OperatorInput {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;

            let unfilled = buf.initialize_unfilled();
            let result = guard.try_io(|fd| {
                // SAFETY: `unfilled` is valid for writes of its length.
                let n = unsafe {
                    libc::read(
                        fd.as_raw_fd(),
                        unfilled.as_mut_ptr().cast(),
                        unfilled.len(),
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match result {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl Drop for OperatorInput {
    fn drop(&mut self) {
        // SAFETY: fcntl F_SETFL on fd 0 with the flags read in `new`; no memory is passed.
        unsafe { libc::fcntl(STDIN, libc::F_SETFL, self.flags) };
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::termios::{InputFlags, OutputFlags};

    use super::*;

    fn cooked() -> Termios {
        // SAFETY: libc::termios is plain data; all-zero is a valid value.
        let mut attrs: libc::termios = unsafe { std::mem::zeroed() };
        attrs.c_lflag = libc::ISIG | libc::ICANON | libc::ECHO | libc::IEXTEN;
        attrs.c_iflag = libc::ICRNL | libc::IXON;
        attrs.c_oflag = libc::OPOST;
        Termios::from(attrs)
    }

    #[test]
    fn test_raw_attributes_keep_signal_keys() {
        let raw = raw_attributes(&cooked());

        assert!(raw.local_flags.contains(LocalFlags::ISIG));
        assert!(!raw.local_flags.contains(LocalFlags::ICANON));
        assert!(!raw.local_flags.contains(LocalFlags::ECHO));
        assert!(!raw.local_flags.contains(LocalFlags::IEXTEN));
        assert!(!raw.input_flags.contains(InputFlags::ICRNL));
        assert!(!raw.output_flags.contains(OutputFlags::OPOST));
    }
}
