//! In-memory exec channel.
//!
//! [`MockTunnel::pair`] returns the client-facing [`ExecChannel`] and the
//! "remote process" end that tests drive: read what the client typed, write
//! output, finish with an exit code, inspect resize/signal calls.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;

use rexec_core::Result;
use rexec_core::backend::{ExecChannel, ExecControl, ExecReader, ExecSpec, ExecWriter};
use rexec_core::cluster::Replica;
use rexec_core::error::Error;
use rexec_core::protocol::{ControlFrame, SignalKind, TermSize};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Remote end of a mock exec channel.
pub struct MockTunnel {
    /// Replica the channel was opened against.
    pub replica: Replica,
    /// Spec the channel was opened with.
    pub spec: ExecSpec,
    /// Reads bytes the client wrote to stdin.
    stdin: Option<DuplexStream>,
    /// Writes bytes the client reads from stdout.
    stdout: Option<DuplexStream>,
    /// Writes bytes the client reads from stderr.
    stderr: Option<DuplexStream>,
    /// Resolves the client's exit future.
    exit: Option<oneshot::Sender<Result<Option<i32>>>>,
    /// Resize/signal calls in arrival order.
    controls: Arc<Mutex<Vec<ControlFrame>>>,
    /// Woken on every recorded control call.
    control_notify: Arc<Notify>,
    /// Cancelled when the client closes the channel.
    closed: CancellationToken,
}

impl MockTunnel {
    /// Build a connected client channel and remote end.
    ///
    /// Streams follow `spec`: stdin only when requested, stderr only
    /// without a tty.
    pub fn pair(replica: Replica, spec: ExecSpec) -> (ExecChannel, MockTunnel) {
        let (client_stdin, remote_stdin) = if spec.stdin {
            let (c, r) = tokio::io::duplex(PIPE_CAPACITY);
            (Some(c), Some(r))
        } else {
            (None, None)
        };
        let (client_stdout, remote_stdout) = tokio::io::duplex(PIPE_CAPACITY);
        let (client_stderr, remote_stderr) = if spec.tty {
            (None, None)
        } else {
            let (c, r) = tokio::io::duplex(PIPE_CAPACITY);
            (Some(c), Some(r))
        };

        let (exit_tx, exit_rx) = oneshot::channel();
        let closed = CancellationToken::new();
        let controls = Arc::new(Mutex::new(Vec::new()));
        let control_notify = Arc::new(Notify::new());

        let exit_closed = closed.clone();
        let exit = Box::pin(async move {
            tokio::select! {
                result = exit_rx => result.unwrap_or(Ok(None)),
                _ = exit_closed.cancelled() => Ok(None),
            }
        });

        let channel = ExecChannel {
            stdin: client_stdin.map(|s| -> ExecWriter { Box::pin(s) }),
            stdout: Box::pin(client_stdout),
            stderr: client_stderr.map(|s| -> ExecReader { Box::pin(s) }),
            exit,
            control: Box::new(MockControl {
                controls: Arc::clone(&controls),
                notify: Arc::clone(&control_notify),
                closed: closed.clone(),
            }),
        };

        let tunnel = MockTunnel {
            replica,
            spec,
            stdin: remote_stdin,
            stdout: Some(remote_stdout),
            stderr: remote_stderr,
            exit: Some(exit_tx),
            controls,
            control_notify,
            closed,
        };

        (channel, tunnel)
    }

    /// Emit bytes on the remote stdout.
    pub async fn write_stdout(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.write_all(data).await,
            None => Err(std::io::ErrorKind::BrokenPipe.into()),
        }
    }

    /// Emit bytes on the remote stderr.
    pub async fn write_stderr(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self.stderr.as_mut() {
            Some(stderr) => stderr.write_all(data).await,
            None => Err(std::io::ErrorKind::BrokenPipe.into()),
        }
    }

    /// Read exactly `len` bytes the client sent on stdin.
    pub async fn read_stdin(&mut self, len: usize) -> std::io::Result<Vec<u8>> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or(std::io::Error::from(std::io::ErrorKind::NotConnected))?;
        let mut buf = vec![0u8; len];
        stdin.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Read client stdin until the client half-closes it.
    pub async fn read_stdin_to_end(&mut self) -> std::io::Result<Vec<u8>> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or(std::io::Error::from(std::io::ErrorKind::NotConnected))?;
        let mut buf = Vec::new();
        stdin.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Close remote stdout and stderr (EOF for the client).
    pub fn close_output(&mut self) {
        self.stdout = None;
        self.stderr = None;
    }

    /// Terminate the remote process with `code`.
    pub fn finish(&mut self, code: i32) {
        if let Some(tx) = self.exit.take() {
            let _ = tx.send(Ok(Some(code)));
        }
    }

    /// Fail the exit future.
    pub fn fail(&mut self, message: &str) {
        if let Some(tx) = self.exit.take() {
            let _ = tx.send(Err(Error::Connection {
                message: message.to_string(),
            }));
        }
    }

    /// Resize/signal calls seen so far.
    pub fn controls(&self) -> Vec<ControlFrame> {
        self.controls.lock().unwrap().clone()
    }

    /// Wait until at least `count` control calls were recorded.
    pub async fn wait_for_controls(&self, count: usize) -> Vec<ControlFrame> {
        loop {
            let notified = self.control_notify.notified();
            let seen = self.controls();
            if seen.len() >= count {
                return seen;
            }
            notified.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Wait for the client to close the channel.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

struct MockControl {
    controls: Arc<Mutex<Vec<ControlFrame>>>,
    notify: Arc<Notify>,
    closed: CancellationToken,
}

impl MockControl {
    fn record(&self, control: ControlFrame) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::Connection {
                message: "exec channel closed".to_string(),
            });
        }
        if let Ok(mut controls) = self.controls.lock() {
            controls.push(control);
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl ExecControl for MockControl {
    async fn resize(&self, size: TermSize) -> Result<()> {
        self.record(ControlFrame::Resize(size))
    }

    async fn signal(&self, kind: SignalKind) -> Result<()> {
        self.record(ControlFrame::Signal(kind))
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
