//! Real pty transport on top of `openpty(3)` and tokio's process support.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::process::Stdio;

use log::{debug, trace};
use nix::pty::{Winsize, openpty};
use tokio::io::unix::AsyncFd;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::config::{CommandSpec, WindowSize};
use super::{ChildProcess, ExitStatus, PtyTransport, Spawner};
use crate::error::SpawnError;

/// Spawns children on real pseudo-terminals.
///
/// The child becomes a session leader with the pty slave as its controlling
/// terminal. The master side is switched to non-blocking mode and driven by
/// tokio's reactor, so every read and write can be abandoned mid-wait.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSpawner;

impl Spawner for NativeSpawner {
    type Pty = NativePty;
    type Child = NativeChild;

    fn spawn(
        &self,
        command: &CommandSpec,
        size: WindowSize,
    ) -> Result<(NativePty, NativeChild), SpawnError> {
        command.validate()?;

        let winsize: Winsize = size.to_winsize();
        let pty = openpty(Some(&winsize), None).map_err(SpawnError::PtyAllocation)?;

        set_nonblocking(pty.master.as_raw_fd()).map_err(SpawnError::PtySetup)?;

        // The command owns the slave copies; dropping it at the end of this
        // block leaves the master as the only parent-side handle.
        let child = {
            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args)
                .envs(command.env.iter().map(|(k, v)| (k, v)))
                .stdin(stdio_from(&pty.slave)?)
                .stdout(stdio_from(&pty.slave)?)
                .stderr(Stdio::from(pty.slave))
                .kill_on_drop(true);

            if let Some(cwd) = &command.cwd {
                cmd.current_dir(cwd);
            }

            // SAFETY: only async-signal-safe libc calls run between fork and
            // exec. stdio is already the pty slave at this point.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    Ok(())
                });
            }

            cmd.spawn().map_err(|source| SpawnError::Os {
                program: command.display_name(),
                source,
            })?
        };

        debug!(
            "spawned '{}' with pid {:?} on a {}x{} pty",
            command.display_name(),
            child.id(),
            size.cols,
            size.rows
        );

        let master = AsyncFd::new(File::from(pty.master)).map_err(SpawnError::PtySetup)?;

        Ok((
            NativePty {
                master,
                write_lock: Mutex::new(()),
            },
            NativeChild { child },
        ))
    }
}

/// Controller side of a real pty.
#[derive(Debug)]
pub struct NativePty {
    master: AsyncFd<File>,

    /// Serialises writers so concurrent `write_all` calls never interleave.
    write_lock: Mutex<()>,
}

impl PtyTransport for NativePty {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.master.readable().await?;

            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.read(buf)
            }) {
                // Linux reports EIO on the master once every slave fd is closed.
                Ok(Err(e)) if e.raw_os_error() == Some(libc::EIO) => {
                    trace!("pty master returned EIO, treating as end of stream");
                    return Ok(0);
                }
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    async fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
        let _serial = self.write_lock.lock().await;

        while !data.is_empty() {
            let mut guard = self.master.writable().await?;

            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.write(data)
            }) {
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }

        Ok(())
    }

    fn resize(&self, size: WindowSize) -> io::Result<()> {
        set_window_size(self.master.as_raw_fd(), size)
    }
}

/// A child process spawned by [`NativeSpawner`].
#[derive(Debug)]
pub struct NativeChild {
    child: Child,
}

impl ChildProcess for NativeChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await.map(ExitStatus::from)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?.map(ExitStatus::from))
    }

    async fn kill(&mut self) -> io::Result<()> {
        match self.child.kill().await {
            // Already reaped by an earlier wait.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}

/// Set the window size on a terminal fd.
pub(crate) fn set_window_size(fd: RawFd, size: WindowSize) -> io::Result<()> {
    let winsize = size.to_winsize();
    // SAFETY: TIOCSWINSZ reads a winsize struct that outlives the call.
    if unsafe { libc::ioctl(fd, libc::TIOCSWINSZ as _, &winsize) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on an fd we own; no memory is passed.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn stdio_from(slave: &OwnedFd) -> Result<Stdio, SpawnError> {
    slave
        .try_clone()
        .map(Stdio::from)
        .map_err(SpawnError::PtySetup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_reports_missing_program() {
        let spec = CommandSpec::new("/nonexistent/expectty-test-binary");
        let err = NativeSpawner
            .spawn(&spec, WindowSize::default())
            .unwrap_err();
        assert!(matches!(err, SpawnError::Os { .. }));
    }

    #[tokio::test]
    async fn test_read_until_end_of_stream() {
        let mut spec = CommandSpec::new("/bin/sh");
        spec.args = vec!["-c".into(), "printf hello".into()];

        let (pty, mut child) = NativeSpawner.spawn(&spec, WindowSize::default()).unwrap();

        let output = read_to_end(&pty).await;
        assert_eq!(output, b"hello");
        assert!(child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_resize_is_visible_to_child() {
        let mut spec = CommandSpec::new("/bin/sh");
        spec.args = vec!["-c".into(), "sleep 0.2; stty size".into()];

        let (pty, mut child) = NativeSpawner
            .spawn(&spec, WindowSize::new(80, 24))
            .unwrap();
        pty.resize(WindowSize::new(132, 50)).unwrap();

        let output = read_to_end(&pty).await;
        assert!(String::from_utf8_lossy(&output).contains("50 132"));
        child.wait().await.unwrap();
    }

    async fn read_to_end(pty: &NativePty) -> Vec<u8> {
        let mut output = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = pty.read(&mut buf).await.unwrap();
            if n == 0 {
                return output;
            }
            output.extend_from_slice(&buf[..n]);
        }
    }
}
