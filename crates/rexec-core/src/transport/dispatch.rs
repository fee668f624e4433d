//! Inbound frame dispatch.
//!
//! Every inbound frame is delivered to each handler of the chain in order.
//! A single interceptor may be installed on top: installing it detaches the
//! current chain, and every frame the interceptor passes on is replayed,
//! unchanged, to the detached handlers. Dropping or restoring the
//! [`InterceptGuard`] puts the detached chain back in its original order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::Frame;

/// Receives inbound frames.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, frame: &Frame);
}

/// Interceptor verdict for one frame.
#[derive(Debug)]
pub enum Intercepted {
    /// The interceptor took the frame; handlers never see it.
    Consumed,
    /// Replay this frame to the detached handler chain.
    Pass(Frame),
}

/// Classifies frames ahead of the handler chain.
pub trait FrameInterceptor: Send + Sync {
    fn intercept(&self, frame: Frame) -> Intercepted;
}

struct Interception {
    token: u64,
    interceptor: Arc<dyn FrameInterceptor>,
    detached: Vec<Arc<dyn FrameHandler>>,
}

#[derive(Default)]
struct DispatchState {
    chain: Vec<Arc<dyn FrameHandler>>,
    interception: Option<Interception>,
}

/// Ordered handler chain plus one interceptor slot.
#[derive(Default)]
pub struct Dispatcher {
    state: Mutex<DispatchState>,
    next_token: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher with an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the chain.
    ///
    /// While intercepted, the handler joins the live chain and still receives
    /// every passed-through frame; it stays after the restored handlers.
    pub fn add_handler(&self, handler: Arc<dyn FrameHandler>) {
        if let Ok(mut state) = self.state.lock() {
            state.chain.push(handler);
        }
    }

    /// Number of handlers that receive non-intercepted frames.
    pub fn handler_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| {
                state.chain.len()
                    + state
                        .interception
                        .as_ref()
                        .map_or(0, |interception| interception.detached.len())
            })
            .unwrap_or(0)
    }

    /// Whether an interceptor is installed.
    pub fn is_intercepted(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.interception.is_some())
            .unwrap_or(false)
    }

    /// Deliver one inbound frame.
    pub fn dispatch(&self, frame: Frame) {
        let (interceptor, handlers) = {
            let Ok(state) = self.state.lock() else {
                warn!("Dispatcher state poisoned, dropping frame");
                return;
            };
            match &state.interception {
                Some(interception) => {
                    let mut handlers = interception.detached.clone();
                    handlers.extend(state.chain.iter().cloned());
                    (Some(Arc::clone(&interception.interceptor)), handlers)
                }
                None => (None, state.chain.clone()),
            }
        };

        let frame = match interceptor {
            Some(interceptor) => match interceptor.intercept(frame) {
                Intercepted::Consumed => return,
                Intercepted::Pass(frame) => frame,
            },
            None => frame,
        };

        trace!(kind = frame.kind_byte(), handlers = handlers.len(), "Dispatching frame");
        for handler in handlers {
            handler.handle(&frame);
        }
    }

    /// Install an interceptor, detaching the current chain.
    ///
    /// Fails with `AlreadyIntercepted` if one is already installed.
    pub fn intercept(
        self: &Arc<Self>,
        interceptor: Arc<dyn FrameInterceptor>,
    ) -> Result<InterceptGuard> {
        let mut state = self.state.lock().map_err(|_| Error::InvalidState {
            expected: "dispatcher".to_string(),
            actual: "poisoned".to_string(),
        })?;
        if state.interception.is_some() {
            return Err(Error::AlreadyIntercepted);
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let detached = std::mem::take(&mut state.chain);
        debug!(token, detached = detached.len(), "Interceptor installed");
        state.interception = Some(Interception {
            token,
            interceptor,
            detached,
        });

        Ok(InterceptGuard {
            dispatcher: Arc::clone(self),
            token,
            restored: AtomicBool::new(false),
        })
    }

    fn restore(&self, token: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state
            .interception
            .as_ref()
            .is_none_or(|interception| interception.token != token)
        {
            return;
        }
        if let Some(interception) = state.interception.take() {
            let added = std::mem::replace(&mut state.chain, interception.detached);
            state.chain.extend(added);
            debug!(token, handlers = state.chain.len(), "Interceptor removed, chain restored");
        }
    }
}

/// Keeps an interceptor installed; restores the original chain on `restore` or drop.
pub struct InterceptGuard {
    dispatcher: Arc<Dispatcher>,
    token: u64,
    restored: AtomicBool,
}

impl InterceptGuard {
    /// Remove the interceptor and restore the detached chain. Idempotent.
    pub fn restore(&self) {
        if !self.restored.swap(true, Ordering::SeqCst) {
            self.dispatcher.restore(self.token);
        }
    }
}

impl Drop for InterceptGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every frame it sees, tagged with its name.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<(&'static str, Frame)>>>,
    }

    impl FrameHandler for Recorder {
        fn handle(&self, frame: &Frame) {
            self.log.lock().unwrap().push((self.name, frame.clone()));
        }
    }

    /// Consumes frames of one kind.
    struct ConsumeKind(u8, Arc<Mutex<Vec<Frame>>>);

    impl FrameInterceptor for ConsumeKind {
        fn intercept(&self, frame: Frame) -> Intercepted {
            if frame.kind_byte() == self.0 {
                self.1.lock().unwrap().push(frame);
                Intercepted::Consumed
            } else {
                Intercepted::Pass(frame)
            }
        }
    }

    fn setup() -> (Arc<Dispatcher>, Arc<Mutex<Vec<(&'static str, Frame)>>>) {
        let dispatcher = Arc::new(Dispatcher::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["rpc", "audit"] {
            dispatcher.add_handler(Arc::new(Recorder {
                name,
                log: Arc::clone(&log),
            }));
        }
        (dispatcher, log)
    }

    #[test]
    fn frames_reach_every_handler_in_order() {
        let (dispatcher, log) = setup();
        dispatcher.dispatch(Frame::request(&b"a"[..]));

        let names: Vec<_> = log.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["rpc", "audit"]);
    }

    #[test]
    fn consumed_frames_never_reach_handlers() {
        let (dispatcher, log) = setup();
        let consumed = Arc::new(Mutex::new(Vec::new()));
        let _guard = dispatcher
            .intercept(Arc::new(ConsumeKind(0xC5, Arc::clone(&consumed))))
            .unwrap();

        dispatcher.dispatch(Frame::new(0xC5, &b"ctl"[..]));

        assert_eq!(consumed.lock().unwrap().len(), 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn passed_frames_are_replayed_unchanged_in_order() {
        let (dispatcher, log) = setup();
        let _guard = dispatcher
            .intercept(Arc::new(ConsumeKind(0xC5, Arc::new(Mutex::new(Vec::new())))))
            .unwrap();

        let frame = Frame::new(0x01, &b"{\"id\":7}"[..]);
        dispatcher.dispatch(frame.clone());

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], ("rpc", frame.clone()));
        assert_eq!(log[1], ("audit", frame));
    }

    #[test]
    fn second_interceptor_is_rejected() {
        let (dispatcher, _) = setup();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let _guard = dispatcher
            .intercept(Arc::new(ConsumeKind(0xC5, Arc::clone(&sink))))
            .unwrap();

        let second = dispatcher.intercept(Arc::new(ConsumeKind(0xC5, sink)));
        assert!(matches!(second, Err(Error::AlreadyIntercepted)));
    }

    #[test]
    fn restore_puts_chain_back_in_original_order() {
        let (dispatcher, log) = setup();
        let consumed = Arc::new(Mutex::new(Vec::new()));
        let guard = dispatcher
            .intercept(Arc::new(ConsumeKind(0xC5, Arc::clone(&consumed))))
            .unwrap();
        assert!(dispatcher.is_intercepted());

        guard.restore();
        guard.restore();
        assert!(!dispatcher.is_intercepted());
        assert_eq!(dispatcher.handler_count(), 2);

        // Control-kind frames are ordinary frames again.
        dispatcher.dispatch(Frame::new(0xC5, &b"ctl"[..]));
        let names: Vec<_> = log.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["rpc", "audit"]);
        assert!(consumed.lock().unwrap().is_empty());
    }

    #[test]
    fn dropping_guard_restores_and_allows_reinstall() {
        let (dispatcher, _) = setup();
        let sink = Arc::new(Mutex::new(Vec::new()));
        {
            let _guard = dispatcher
                .intercept(Arc::new(ConsumeKind(0xC5, Arc::clone(&sink))))
                .unwrap();
        }
        assert!(!dispatcher.is_intercepted());
        assert!(dispatcher.intercept(Arc::new(ConsumeKind(0xC5, sink))).is_ok());
    }

    #[test]
    fn handlers_added_while_intercepted_follow_restored_chain() {
        let (dispatcher, log) = setup();
        let guard = dispatcher
            .intercept(Arc::new(ConsumeKind(0xC5, Arc::new(Mutex::new(Vec::new())))))
            .unwrap();
        dispatcher.add_handler(Arc::new(Recorder {
            name: "late",
            log: Arc::clone(&log),
        }));
        drop(guard);

        dispatcher.dispatch(Frame::request(&b"x"[..]));
        let names: Vec<_> = log.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["rpc", "audit", "late"]);
    }
}
