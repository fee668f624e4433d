//! Backend cluster interface.
//!
//! A backend is one independent cluster that can list the replicas of a
//! compute unit and open raw exec channels into them. Implementations live
//! outside this crate (the local process backend in `rexec-client`, mocks in
//! `rexec-test-utils`).

use std::pin::Pin;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::cluster::{ClusterId, ComputeUnit, Replica};
use crate::error::Result;
use crate::protocol::{SignalKind, TermSize};

/// Boxed readable byte stream from the remote process.
pub type ExecReader = Pin<Box<dyn AsyncRead + Send>>;

/// Boxed writable byte stream to the remote process.
pub type ExecWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Resolves once the remote process terminates.
///
/// `Ok(None)` means the channel ended without reporting an exit code.
pub type ExitFuture = BoxFuture<'static, Result<Option<i32>>>;

/// What to run and how to attach to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    /// argv of the remote command.
    pub command: Vec<String>,
    /// Attach stdin.
    pub stdin: bool,
    /// Allocate a pseudo-terminal.
    pub tty: bool,
    /// Initial pty size (ignored without `tty`).
    pub term_size: TermSize,
}

/// Control actions on an open exec channel.
#[async_trait]
pub trait ExecControl: Send + Sync {
    /// Resize the remote pseudo-terminal.
    async fn resize(&self, size: TermSize) -> Result<()>;

    /// Deliver a signal to the remote process.
    async fn signal(&self, kind: SignalKind) -> Result<()>;

    /// Tear down the channel, terminating the remote process if still running.
    ///
    /// Must be idempotent.
    fn close(&self);
}

/// An open exec channel as handed out by a backend.
pub struct ExecChannel {
    /// Remote stdin (present iff stdin was requested).
    pub stdin: Option<ExecWriter>,
    /// Remote stdout (the merged stream under a tty).
    pub stdout: ExecReader,
    /// Remote stderr (absent under a tty).
    pub stderr: Option<ExecReader>,
    /// Remote exit code.
    pub exit: ExitFuture,
    /// Resize/signal/close.
    pub control: Box<dyn ExecControl>,
}

impl std::fmt::Debug for ExecChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecChannel")
            .field("stdin", &self.stdin.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// One backend cluster.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// The cluster this backend serves.
    fn cluster(&self) -> ClusterId;

    /// Look up a compute unit. `Ok(None)` if the cluster does not know it.
    ///
    /// Returned replicas may be in any phase; callers filter.
    async fn discover(&self, unit: &str) -> Result<Option<ComputeUnit>>;

    /// Open an exec channel into a replica owned by this cluster.
    ///
    /// Fails with `Connection` on transport failure and `RemoteExec` when the
    /// request is rejected.
    async fn exec(&self, replica: &Replica, spec: &ExecSpec) -> Result<ExecChannel>;
}
