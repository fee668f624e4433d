//! Tunnel establisher.
//!
//! Opens exactly one exec channel against the backend owning the selected
//! replica and wraps it in a [`Tunnel`] handle whose streams can be taken by
//! the coupler while control actions and close stay shared.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rexec_core::backend::{ClusterBackend, ExecControl, ExecReader, ExecSpec, ExecWriter, ExitFuture};
use rexec_core::cluster::Replica;
use rexec_core::error::{Error, Result};
use rexec_core::protocol::{ExecRequest, SignalKind, TermSize};

/// Exec parameters for a request: stdin iff interactive, pty iff terminal.
pub fn exec_spec(request: &ExecRequest, term_size: TermSize) -> ExecSpec {
    ExecSpec {
        command: request.argv(),
        stdin: request.interactive,
        tty: request.terminal,
        term_size,
    }
}

/// An open exec channel into one replica.
pub struct Tunnel {
    replica: Replica,
    stdin: Option<ExecWriter>,
    stdout: Option<ExecReader>,
    stderr: Option<ExecReader>,
    exit: Option<ExitFuture>,
    control: Arc<dyn ExecControl>,
    closed: Arc<AtomicBool>,
}

impl Tunnel {
    /// Open a tunnel, bounded by `connect_timeout` and abortable via `cancel`.
    pub async fn open(
        backend: &dyn ClusterBackend,
        replica: &Replica,
        spec: &ExecSpec,
        connect_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        debug!(pod = %replica.pod, cluster = %replica.cluster, ?spec, "Opening tunnel");

        let channel = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Aborted),
            result = tokio::time::timeout(connect_timeout, backend.exec(replica, spec)) => match result {
                Ok(channel) => channel?,
                Err(_) => {
                    return Err(Error::Connection {
                        message: format!(
                            "timed out after {:?} opening exec into {}",
                            connect_timeout, replica.pod
                        ),
                    });
                }
            },
        };

        if spec.stdin && channel.stdin.is_none() {
            warn!(pod = %replica.pod, "Backend did not attach stdin");
        }
        info!(
            pod = %replica.pod,
            cluster = %replica.cluster,
            tty = spec.tty,
            "Tunnel established"
        );

        Ok(Self {
            replica: replica.clone(),
            stdin: channel.stdin,
            stdout: Some(channel.stdout),
            stderr: channel.stderr,
            exit: Some(channel.exit),
            control: Arc::from(channel.control),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn take_stdin(&mut self) -> Option<ExecWriter> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ExecReader> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ExecReader> {
        self.stderr.take()
    }

    /// The exit-code future. Can be taken once.
    pub fn take_exit(&mut self) -> Option<ExitFuture> {
        self.exit.take()
    }

    pub async fn resize(&self, size: TermSize) -> Result<()> {
        self.control.resize(size).await
    }

    pub async fn signal(&self, kind: SignalKind) -> Result<()> {
        self.control.signal(kind).await
    }

    /// Shared control handle, for the control pump.
    pub fn control(&self) -> Arc<dyn ExecControl> {
        Arc::clone(&self.control)
    }

    /// A handle that can close the tunnel from elsewhere.
    pub fn closer(&self) -> TunnelCloser {
        TunnelCloser {
            control: Arc::clone(&self.control),
            closed: Arc::clone(&self.closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        self.closer().close();
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Closes a tunnel without owning it.
#[derive(Clone)]
pub struct TunnelCloser {
    control: Arc<dyn ExecControl>,
    closed: Arc<AtomicBool>,
}

impl TunnelCloser {
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing tunnel");
            self.control.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
