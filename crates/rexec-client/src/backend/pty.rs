//! Pseudo-terminal plumbing for the local backend.
//!
//! Handles:
//! - Allocating a pty pair sized to the caller's terminal
//! - Async I/O on the master side
//! - Terminal resize
//!
//! Uses the `nix` crate for the pty pair and `AsyncFd` to integrate the
//! master with tokio's reactor.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::pty::{Winsize, openpty};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::debug;

use rexec_core::error::{Error, Result};
use rexec_core::protocol::TermSize;

/// Master side of an allocated pty, plus the slave until it is handed to a child.
pub struct Pty {
    master: Arc<AsyncFd<std::fs::File>>,
    slave: Option<OwnedFd>,
}

impl Pty {
    /// Allocate a pty pair with the given window size.
    pub fn open(size: TermSize) -> Result<Self> {
        let pair = openpty(&winsize(size), None).map_err(|e| Error::RemoteExec {
            message: format!("failed to open pty: {}", e),
        })?;

        set_nonblocking(pair.master.as_raw_fd())?;
        // SAFETY: the File owns the master fd and is never swapped out of the AsyncFd.
        let master = unsafe { AsyncFd::register(std::fs::File::from(pair.master)) }
            .map_err(io::Error::from)?;

        Ok(Self {
            master: Arc::new(master),
            slave: Some(pair.slave),
        })
    }

    /// Stdio handles for the child: the slave on stdin, stdout and stderr.
    pub fn child_stdio(&mut self) -> Result<(Stdio, Stdio, Stdio)> {
        let slave = self.slave.take().ok_or_else(|| Error::InvalidState {
            expected: "unassigned pty slave".to_string(),
            actual: "slave already handed out".to_string(),
        })?;
        let stdout = slave.try_clone()?;
        let stderr = slave.try_clone()?;
        Ok((Stdio::from(slave), Stdio::from(stdout), Stdio::from(stderr)))
    }

    /// Split the master into independent read and write halves.
    pub fn split(&self) -> (PtyReader, PtyWriter) {
        (
            PtyReader {
                master: Arc::clone(&self.master),
            },
            PtyWriter {
                master: Arc::clone(&self.master),
            },
        )
    }

    /// Raw master fd, for ioctls.
    pub fn master_fd(&self) -> RawFd {
        self.master.get_ref().as_raw_fd()
    }

    pub fn resizer(&self) -> PtyResizer {
        PtyResizer {
            master: Arc::clone(&self.master),
        }
    }
}

/// Resizes a pty after the master has been split.
#[derive(Clone)]
pub struct PtyResizer {
    master: Arc<AsyncFd<std::fs::File>>,
}

impl PtyResizer {
    pub fn resize(&self, size: TermSize) -> Result<()> {
        let ws = winsize(size);
        let fd = self.master.get_ref().as_raw_fd();
        // SAFETY: fd is an open pty master owned by `self.master`.
        let result = unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &ws) };
        if result == -1 {
            let err = io::Error::last_os_error();
            return Err(Error::RemoteExec {
                message: format!("failed to resize pty: {}", err),
            });
        }
        debug!(cols = size.cols, rows = size.rows, "PTY resized");
        Ok(())
    }
}

/// Read half of a pty master. EIO (slave closed) reads as EOF.
pub struct PtyReader {
    master: Arc<AsyncFd<std::fs::File>>,
}

impl AsyncRead for PtyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.master.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) if e.raw_os_error() == Some(libc::EIO) => {
                    debug!("PTY read returned EIO (process likely exited)");
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

/// Write half of a pty master.
pub struct PtyWriter {
    master: Arc<AsyncFd<std::fs::File>>,
}

impl AsyncWrite for PtyWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.master.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(data)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    // A pty has no half-close; the line discipline sees EOF when the
    // process reads ^D, which is the caller's to send.
    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn winsize(size: TermSize) -> Winsize {
    Winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
