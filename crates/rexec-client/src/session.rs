//! Session orchestration.
//!
//! Drives one session through `Establishing -> Active -> Closing -> Closed`:
//! discover and select a replica, open the tunnel, take over control frames
//! on the host transport, couple the streams, then finalize. Every resource
//! registers its cleanup with the [`Finalizer`] as it is acquired, so the
//! same teardown runs on success, failure and cancellation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rexec_core::cluster::Replica;
use rexec_core::error::Result;
use rexec_core::events::EventListener;
use rexec_core::protocol::{ControlFrame, ExecRequest, TermSize};
use rexec_core::session::{ExitCode, ExitHook, Finalizer, Session, SessionId, SessionStatus};
use rexec_core::transport::{ControlInterceptor, Dispatcher};

use crate::config::SessionConfig;
use crate::coupler::{CallerIo, couple};
use crate::router::ClusterRouter;
use crate::terminal::{RawModeGuard, SignalSource};
use crate::tunnel::{Tunnel, exec_spec};

/// How the session attaches to the caller.
pub struct Attachment {
    /// Caller byte streams.
    pub io: CallerIo,
    /// Host transport dispatcher to intercept control frames on.
    pub host: Option<Arc<Dispatcher>>,
    /// Put the caller's terminal in raw mode for pty sessions.
    pub raw_mode: bool,
    /// Forward OS signals and window changes.
    pub os_signals: bool,
    /// Initial pty size.
    pub term_size: TermSize,
}

impl Attachment {
    /// Plain streams: no host transport, no terminal handling.
    pub fn streams(io: CallerIo) -> Self {
        Self {
            io,
            host: None,
            raw_mode: false,
            os_signals: false,
            term_size: TermSize::default(),
        }
    }
}

/// What a finished session looked like.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: SessionId,
    pub replica: Option<Replica>,
    pub status: SessionStatus,
    pub exit_code: i32,
}

/// Runs sessions against a set of clusters.
pub struct SessionRunner {
    router: Arc<ClusterRouter>,
    config: SessionConfig,
}

impl SessionRunner {
    pub fn new(router: Arc<ClusterRouter>, config: SessionConfig) -> Self {
        Self { router, config }
    }

    /// Run one session to completion.
    ///
    /// Cleanup and the exit hook run before this returns; an error is then
    /// re-surfaced to the caller. Cancellation ends the session with exit
    /// code 0 unless the remote code is already known.
    pub async fn run(
        &self,
        request: ExecRequest,
        attachment: Attachment,
        cancel: CancellationToken,
        finalizer: &Finalizer,
        hook: &dyn ExitHook,
    ) -> Result<SessionReport> {
        let mut session = Session::new(request);
        let exit_code = ExitCode::new();
        info!(
            session = %session.id(),
            unit = session.unit(),
            interactive = session.request().interactive,
            terminal = session.request().terminal,
            "Session starting"
        );

        let result = self
            .drive(&mut session, attachment, &cancel, finalizer, &exit_code)
            .await;

        if let Err(e) = session.begin_close(exit_code.get()) {
            warn!(error = %e, "Unexpected session state at close");
        }
        let error = result.err();
        match &error {
            Some(e) if e.is_application_error() => error!(session = %session.id(), error = %e, "Session failed"),
            Some(_) => info!(session = %session.id(), "Session aborted"),
            None => {}
        }

        let code = exit_code.resolve(error.as_ref());
        finalizer.finish(hook, code, error.as_ref());
        session.close()?;
        info!(session = %session.id(), exit_code = code, "Session closed");

        match error {
            Some(e) => Err(e),
            None => Ok(SessionReport {
                id: session.id(),
                replica: session.replica().cloned(),
                status: session.status(),
                exit_code: code,
            }),
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        attachment: Attachment,
        cancel: &CancellationToken,
        finalizer: &Finalizer,
        exit_code: &ExitCode,
    ) -> Result<()> {
        let request = session.request().clone();
        let Attachment {
            io,
            host,
            raw_mode,
            os_signals,
            term_size,
        } = attachment;

        if request.terminal && raw_mode {
            match RawModeGuard::enter() {
                Ok(guard) => finalizer.register("raw mode", move || {
                    guard.restore();
                    Ok(())
                }),
                Err(e) => warn!(error = %e, "Could not enter raw mode"),
            }
        }

        let mut listener = EventListener::<ControlFrame>::new(cancel.clone());
        if os_signals {
            listener.add_source(Box::new(SignalSource::for_session(request.terminal)))?;
        }
        let teardown = listener.teardown_handle();
        finalizer.register("event listener", move || {
            teardown.teardown();
            Ok(())
        });

        let replica = self
            .router
            .resolve(&request.compute_unit_name, request.replica_filter(), cancel)
            .await?;
        session.bind_replica(replica.clone())?;

        let backend = self.router.backend_for(&replica)?;
        let spec = exec_spec(&request, term_size);
        let mut tunnel = Tunnel::open(
            backend.as_ref(),
            &replica,
            &spec,
            self.config.connect_timeout,
            cancel,
        )
        .await?;
        let closer = tunnel.closer();
        finalizer.register("tunnel", move || {
            closer.close();
            Ok(())
        });

        if let Some(dispatcher) = host {
            let guard = dispatcher.intercept(Arc::new(ControlInterceptor::new(listener.sink())))?;
            finalizer.register("control interceptor", move || {
                guard.restore();
                Ok(())
            });
        }

        session.activate()?;
        debug!(session = %session.id(), pod = %replica.pod, "Session active");

        let code = couple(&mut tunnel, io, Some(&mut listener), &self.config, cancel).await?;
        if let Some(code) = code {
            exit_code.set(code);
        }
        Ok(())
    }
}
