//! Event listener adapter.
//!
//! Turns push-style callback sources (signal handlers, resize notifications,
//! intercepted control frames) into a single asynchronous sequence with one
//! reader. The buffer is a single latest-wins slot: an event pushed before the
//! previous one was read replaces it.
//!
//! Lifecycle:
//! - sources are installed lazily on the first read (or `start`)
//! - `teardown` uninstalls every installed source exactly once
//! - after teardown or cancellation every read yields [`Next::Stopped`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A push-style event source.
pub trait EventSource<E>: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Start delivering events into `sink`.
    fn install(&mut self, sink: EventSink<E>) -> Result<()>;

    /// Stop delivering events. Only called after a successful `install`.
    fn uninstall(&mut self);
}

/// Outcome of waiting for the next event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next<E> {
    /// The most recent event.
    Event(E),
    /// The listener was torn down or cancelled.
    Stopped,
}

struct Slot<E> {
    value: Mutex<Option<E>>,
    notify: Notify,
    closed: AtomicBool,
}

impl<E> Slot<E> {
    fn take(&self) -> Option<E> {
        self.value.lock().ok().and_then(|mut value| value.take())
    }
}

/// Handle for pushing events into a listener. Cheap to clone.
pub struct EventSink<E> {
    slot: Arc<Slot<E>>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<E> EventSink<E> {
    /// Publish an event, replacing any unread one.
    ///
    /// Events pushed after teardown are dropped.
    pub fn push(&self, event: E) {
        if self.slot.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut value) = self.slot.value.lock() {
            *value = Some(event);
        }
        self.slot.notify.notify_one();
    }

    /// Whether the listener has been torn down.
    pub fn is_closed(&self) -> bool {
        self.slot.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Installed,
    TornDown,
}

struct Shared<E> {
    slot: Arc<Slot<E>>,
    sources: Mutex<(Phase, Vec<Box<dyn EventSource<E>>>)>,
}

impl<E> Shared<E> {
    fn teardown(&self) {
        let installed = {
            let Ok(mut guard) = self.sources.lock() else {
                return;
            };
            let (phase, sources) = &mut *guard;
            let previous = *phase;
            *phase = Phase::TornDown;
            let taken = std::mem::take(sources);
            if previous == Phase::Installed {
                taken
            } else {
                Vec::new()
            }
        };

        for mut source in installed {
            debug!(source = source.name(), "Uninstalling event source");
            source.uninstall();
        }

        self.slot.closed.store(true, Ordering::SeqCst);
        self.slot.take();
        self.slot.notify.notify_one();
    }
}

/// Single-reader, latest-wins event sequence over push-style sources.
pub struct EventListener<E> {
    shared: Arc<Shared<E>>,
    cancel: CancellationToken,
}

impl<E: Send + 'static> EventListener<E> {
    /// Create a listener. Nothing is installed until the first read.
    pub fn new(cancel: CancellationToken) -> Self {
        let slot = Arc::new(Slot {
            value: Mutex::new(None),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });
        Self {
            shared: Arc::new(Shared {
                slot,
                sources: Mutex::new((Phase::Idle, Vec::new())),
            }),
            cancel,
        }
    }

    /// Add a source. Sources added after installation are installed immediately.
    pub fn add_source(&self, mut source: Box<dyn EventSource<E>>) -> Result<()> {
        let mut guard = self.shared.sources.lock().map_err(|_| Error::InvalidState {
            expected: "event listener".to_string(),
            actual: "poisoned".to_string(),
        })?;
        let (phase, sources) = &mut *guard;
        match phase {
            Phase::Idle => sources.push(source),
            Phase::Installed => {
                source.install(self.sink())?;
                sources.push(source);
            }
            Phase::TornDown => {
                debug!(source = source.name(), "Listener torn down, dropping source");
            }
        }
        Ok(())
    }

    /// A sink feeding this listener.
    pub fn sink(&self) -> EventSink<E> {
        EventSink {
            slot: Arc::clone(&self.shared.slot),
        }
    }

    /// A handle that tears the listener down from elsewhere (e.g. a finalizer).
    pub fn teardown_handle(&self) -> ListenerTeardown {
        let shared = Arc::clone(&self.shared);
        ListenerTeardown {
            run: Arc::new(move || shared.teardown()),
        }
    }

    /// Install all sources if not done yet.
    ///
    /// A source that fails to install is logged and skipped; the others keep
    /// working.
    pub fn start(&self) {
        let Ok(mut guard) = self.shared.sources.lock() else {
            return;
        };
        let (phase, sources) = &mut *guard;
        if *phase != Phase::Idle {
            return;
        }
        *phase = Phase::Installed;

        let sink = self.sink();
        let mut installed = Vec::with_capacity(sources.len());
        for mut source in sources.drain(..) {
            match source.install(sink.clone()) {
                Ok(()) => {
                    debug!(source = source.name(), "Installed event source");
                    installed.push(source);
                }
                Err(e) => warn!(source = source.name(), error = %e, "Failed to install event source"),
            }
        }
        *sources = installed;
    }

    /// Wait for the next event.
    ///
    /// Resolves to the latest unread event, or `Stopped` once the listener is
    /// torn down or cancelled. Never resolves twice for the same event.
    pub async fn next(&mut self) -> Next<E> {
        self.start();

        loop {
            if let Some(event) = self.shared.slot.take() {
                return Next::Event(event);
            }
            if self.shared.slot.closed.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
                return Next::Stopped;
            }

            tokio::select! {
                _ = self.shared.slot.notify.notified() => {}
                _ = self.cancel.cancelled() => return Next::Stopped,
            }
        }
    }

    /// Uninstall all sources. Idempotent.
    pub fn teardown(&self) {
        self.shared.teardown();
    }
}

impl<E> Drop for EventListener<E> {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

/// Cloneable teardown trigger for an [`EventListener`].
#[derive(Clone)]
pub struct ListenerTeardown {
    run: Arc<dyn Fn() + Send + Sync>,
}

impl ListenerTeardown {
    /// Uninstall the listener's sources. Idempotent.
    pub fn teardown(&self) {
        (self.run)();
    }
}

impl std::fmt::Debug for ListenerTeardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerTeardown").finish_non_exhaustive()
    }
}
