//! Stream coupler.
//!
//! Runs every pump of a session concurrently on the current task:
//! - caller stdin -> tunnel stdin (interactive sessions only)
//! - tunnel stdout -> caller stdout
//! - tunnel stderr -> caller stderr (absent under a pty)
//! - control events -> tunnel resize/signal
//!
//! The pumps stop together as soon as the exit code resolves, the session is
//! cancelled, or a pump hits an I/O error. Stream EOF alone ends only that
//! pump. After the exit code resolves the output pumps get a short drain
//! window to flush what the remote process already wrote.

use std::future::pending;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use rexec_core::backend::{ExecControl, ExecWriter};
use rexec_core::error::{Error, Result};
use rexec_core::events::{EventListener, Next};
use rexec_core::protocol::ControlFrame;

use crate::config::SessionConfig;
use crate::tunnel::Tunnel;

type CallerReader = Pin<Box<dyn AsyncRead + Send>>;
type CallerWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// The caller's side of the byte streams.
pub struct CallerIo {
    pub stdin: Option<CallerReader>,
    pub stdout: CallerWriter,
    pub stderr: CallerWriter,
}

impl CallerIo {
    pub fn new(
        stdin: Option<impl AsyncRead + Send + 'static>,
        stdout: impl AsyncWrite + Send + 'static,
        stderr: impl AsyncWrite + Send + 'static,
    ) -> Self {
        Self {
            stdin: stdin.map(|s| -> CallerReader { Box::pin(s) }),
            stdout: Box::pin(stdout),
            stderr: Box::pin(stderr),
        }
    }

    /// This process's stdin, stdout and stderr.
    pub fn process() -> Self {
        Self::new(
            Some(tokio::io::stdin()),
            tokio::io::stdout(),
            tokio::io::stderr(),
        )
    }
}

/// Couple the caller's streams and control events to an open tunnel.
///
/// Returns the remote exit code (`None` if the channel ended without one),
/// `Aborted` on cancellation, or the first pump failure.
pub async fn couple(
    tunnel: &mut Tunnel,
    caller: CallerIo,
    events: Option<&mut EventListener<ControlFrame>>,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> Result<Option<i32>> {
    let mut exit = tunnel.take_exit().ok_or_else(|| Error::InvalidState {
        expected: "tunnel with pending exit code".to_string(),
        actual: "exit code already taken".to_string(),
    })?;
    let buffer_size = config.buffer_size;
    let CallerIo {
        stdin: caller_stdin,
        stdout: caller_stdout,
        stderr: caller_stderr,
    } = caller;
    let tunnel_stdin = tunnel.take_stdin();
    let tunnel_stdout = tunnel.take_stdout();
    let tunnel_stderr = tunnel.take_stderr();
    let control = tunnel.control();

    let stdin_pump = async move {
        match (caller_stdin, tunnel_stdin) {
            (Some(src), Some(dst)) => pump_stdin(src, dst, buffer_size).await,
            _ => pending::<io::Result<()>>().await,
        }
    };
    let stdout_pump = async move {
        match tunnel_stdout {
            Some(src) => pump(src, caller_stdout, buffer_size, "stdout").await,
            None => Ok(()),
        }
    };
    let stderr_pump = async move {
        match tunnel_stderr {
            Some(src) => pump(src, caller_stderr, buffer_size, "stderr").await,
            None => Ok(()),
        }
    };
    let control_pump = async move {
        match events {
            Some(events) => pump_control(events, control).await,
            None => pending::<()>().await,
        }
    };

    tokio::pin!(stdin_pump, stdout_pump, stderr_pump, control_pump);
    let mut stdin_done = false;
    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut control_done = false;

    let exit_code = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Session cancelled, stopping pumps");
                return Err(Error::Aborted);
            }
            result = &mut exit => {
                let code = result?;
                debug!(?code, "Remote exit code resolved");
                break code;
            }
            result = &mut stdin_pump, if !stdin_done => {
                result.map_err(pump_error("stdin"))?;
                stdin_done = true;
            }
            result = &mut stdout_pump, if !stdout_done => {
                result.map_err(pump_error("stdout"))?;
                stdout_done = true;
            }
            result = &mut stderr_pump, if !stderr_done => {
                result.map_err(pump_error("stderr"))?;
                stderr_done = true;
            }
            _ = &mut control_pump, if !control_done => {
                control_done = true;
            }
        }
    };

    let drain = async {
        let stdout = async {
            if !stdout_done {
                let _ = (&mut stdout_pump).await;
            }
        };
        let stderr = async {
            if !stderr_done {
                let _ = (&mut stderr_pump).await;
            }
        };
        tokio::join!(stdout, stderr);
    };
    if tokio::time::timeout(config.drain_timeout, drain).await.is_err() {
        debug!(timeout = ?config.drain_timeout, "Output drain window elapsed");
    }

    Ok(exit_code)
}

fn pump_error(name: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |e| {
        warn!(pump = name, error = %e, "Pump failed");
        Error::Io(e)
    }
}

/// Copy `src` to `dst` until EOF, flushing every chunk.
async fn pump<R, W>(mut src: R, mut dst: W, buffer_size: usize, name: &'static str) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            debug!(pump = name, bytes = total, "Pump reached EOF");
            return Ok(());
        }
        dst.write_all(&buf[..n]).await?;
        dst.flush().await?;
        total += n as u64;
        trace!(pump = name, len = n, "Pumped chunk");
    }
}

/// Caller stdin to tunnel stdin; EOF half-closes the tunnel side.
///
/// A broken pipe means the remote process closed its stdin, which is not a
/// session failure.
async fn pump_stdin<R>(src: R, mut dst: ExecWriter, buffer_size: usize) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    match pump(src, &mut dst, buffer_size, "stdin").await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Remote closed stdin");
            return Ok(());
        }
        Err(e) => return Err(e),
    }
    if let Err(e) = dst.shutdown().await {
        debug!(error = %e, "Half-closing tunnel stdin failed");
    }
    Ok(())
}

/// Apply control events to the tunnel until the listener stops.
async fn pump_control(events: &mut EventListener<ControlFrame>, control: Arc<dyn ExecControl>) {
    loop {
        let result = match events.next().await {
            Next::Event(ControlFrame::Resize(size)) => {
                debug!(cols = size.cols, rows = size.rows, "Forwarding resize");
                control.resize(size).await
            }
            Next::Event(ControlFrame::Signal(kind)) => {
                debug!(signal = %kind, "Forwarding signal");
                control.signal(kind).await
            }
            Next::Stopped => {
                debug!("Control events stopped");
                return;
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Control action failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rexec_core::cluster::{ClusterId, ReplicaPhase};
    use rexec_core::protocol::{ExecRequest, TermSize};
    use rexec_test_utils::{MockBackend, MockTunnel, replica};
    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::tunnel::exec_spec;

    async fn open(request: &ExecRequest) -> (Tunnel, MockTunnel) {
        let backend = MockBackend::new(ClusterId::UsEast);
        let target = replica("pod-a-1", ClusterId::UsEast, ReplicaPhase::Running);
        let tunnel = Tunnel::open(
            &backend,
            &target,
            &exec_spec(request, TermSize::default()),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let remote = backend.next_tunnel().await.unwrap();
        (tunnel, remote)
    }

    fn caller() -> (CallerIo, DuplexStream, DuplexStream) {
        let (stdout_w, stdout_r) = tokio::io::duplex(4096);
        let (stderr_w, stderr_r) = tokio::io::duplex(4096);
        (
            CallerIo::new(None::<DuplexStream>, stdout_w, stderr_w),
            stdout_r,
            stderr_r,
        )
    }

    #[tokio::test]
    async fn output_eof_does_not_end_session() {
        let (mut tunnel, mut remote) = open(&ExecRequest::new("web")).await;
        let (io, mut stdout, mut stderr) = caller();
        let config = SessionConfig::default();
        let cancel = CancellationToken::new();

        let coupled = couple(&mut tunnel, io, None, &config, &cancel);
        let driver = async {
            remote.write_stdout(b"out").await.unwrap();
            remote.write_stderr(b"err").await.unwrap();
            remote.close_output();
            tokio::time::sleep(Duration::from_millis(30)).await;
            remote.finish(3);
        };
        let (code, ()) = tokio::join!(coupled, driver);
        assert_eq!(code.unwrap(), Some(3));

        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await.unwrap();
        let mut err = Vec::new();
        stderr.read_to_end(&mut err).await.unwrap();
        assert_eq!(out, b"out");
        assert_eq!(err, b"err");
    }

    #[tokio::test]
    async fn cancellation_stops_pumps() {
        let (mut tunnel, _remote) = open(&ExecRequest::new("web")).await;
        let (io, _stdout, _stderr) = caller();
        let config = SessionConfig::default();
        let cancel = CancellationToken::new();

        let coupled = couple(&mut tunnel, io, None, &config, &cancel);
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(coupled, canceller);
        assert!(matches!(result, Err(Error::Aborted)));
    }

    #[tokio::test]
    async fn exit_failure_is_surfaced() {
        let (mut tunnel, mut remote) = open(&ExecRequest::new("web")).await;
        let (io, _stdout, _stderr) = caller();
        remote.fail("stream reset");

        let result = couple(&mut tunnel, io, None, &SessionConfig::default(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Connection { .. })));
    }

    #[tokio::test]
    async fn resize_burst_delivers_latest_only() {
        let mut request = ExecRequest::new("web");
        request.terminal = true;
        let (mut tunnel, mut remote) = open(&request).await;
        let (io, _stdout, _stderr) = caller();
        let cancel = CancellationToken::new();
        let mut listener = EventListener::<ControlFrame>::new(cancel.clone());

        let sink = listener.sink();
        sink.push(ControlFrame::Resize(TermSize { cols: 80, rows: 24 }));
        sink.push(ControlFrame::Resize(TermSize { cols: 100, rows: 40 }));

        let config = SessionConfig::default();
        let coupled = couple(&mut tunnel, io, Some(&mut listener), &config, &cancel);
        let driver = async {
            let seen = remote.wait_for_controls(1).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.finish(0);
            seen
        };
        let (code, seen) = tokio::join!(coupled, driver);

        assert_eq!(code.unwrap(), Some(0));
        assert_eq!(seen, vec![ControlFrame::Resize(TermSize { cols: 100, rows: 40 })]);
        assert_eq!(remote.controls().len(), 1);
    }
}
