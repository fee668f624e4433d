//! Session finalizer.
//!
//! Cleanup actions are registered as each resource is acquired and run in
//! reverse order, at most once, on every exit path. The final step hands the
//! exit code to an [`ExitHook`], which in the CLI terminates the process.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::constants::FAILURE_EXIT_CODE;
use crate::error::{Error, Result};

type Action = Box<dyn FnOnce() -> Result<()> + Send>;

#[derive(Default)]
struct Inner {
    actions: Vec<(&'static str, Action)>,
    finished: bool,
}

/// Ordered, run-once list of cleanup actions.
#[derive(Clone, Default)]
pub struct Finalizer {
    inner: Arc<Mutex<Inner>>,
    exited: Arc<AtomicBool>,
}

impl Finalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup action.
    ///
    /// If the finalizer has already run, the action runs immediately so a
    /// resource acquired during a racing shutdown is still released.
    pub fn register<F>(&self, name: &'static str, action: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let action: Action = Box::new(action);
        let late = match self.inner.lock() {
            Ok(mut inner) if !inner.finished => {
                inner.actions.push((name, action));
                None
            }
            _ => Some(action),
        };
        if let Some(action) = late {
            debug!(action = name, "Finalizer already ran, releasing immediately");
            run_action(name, action);
        }
    }

    /// Number of actions waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.lock().map(|inner| inner.actions.len()).unwrap_or(0)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.lock().map(|inner| inner.finished).unwrap_or(true)
    }

    /// Run every registered action in reverse order.
    ///
    /// Returns how many actions ran; only the first call runs anything.
    pub fn run(&self) -> usize {
        let actions = match self.inner.lock() {
            Ok(mut inner) if !inner.finished => {
                inner.finished = true;
                std::mem::take(&mut inner.actions)
            }
            _ => return 0,
        };

        let count = actions.len();
        for (name, action) in actions.into_iter().rev() {
            run_action(name, action);
        }
        debug!(count, "Finalizer complete");
        count
    }

    /// Run cleanup, then report the exit code to `hook` exactly once.
    pub fn finish(&self, hook: &dyn ExitHook, code: i32, error: Option<&Error>) {
        self.run();
        if !self.exited.swap(true, Ordering::SeqCst) {
            hook.exit(code, error);
        }
    }
}

fn run_action(name: &'static str, action: Action) {
    match catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(())) => debug!(action = name, "Cleanup action done"),
        Ok(Err(e)) => warn!(action = name, error = %e, "Cleanup action failed"),
        Err(_) => warn!(action = name, "Cleanup action panicked"),
    }
}

/// Final step of a session: receives the process exit code.
pub trait ExitHook: Send + Sync {
    fn exit(&self, code: i32, error: Option<&Error>);
}

/// Terminates the host process.
pub struct ProcessExit;

impl ExitHook for ProcessExit {
    fn exit(&self, code: i32, error: Option<&Error>) {
        if let Some(e) = error.filter(|e| e.is_application_error()) {
            eprintln!("rexec: {}", e);
        }
        std::process::exit(code);
    }
}

/// Remote exit code, recorded once it resolves.
#[derive(Debug, Clone, Default)]
pub struct ExitCode {
    code: Arc<Mutex<Option<i32>>>,
}

impl ExitCode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, code: i32) {
        if let Ok(mut slot) = self.code.lock() {
            *slot = Some(code);
        }
    }

    pub fn get(&self) -> Option<i32> {
        self.code.lock().ok().and_then(|slot| *slot)
    }

    /// Code to exit the host process with.
    ///
    /// The remote code wins when known; otherwise an application error maps
    /// to 1 and everything else, cancellation included, to 0.
    pub fn resolve(&self, error: Option<&Error>) -> i32 {
        match (self.get(), error) {
            (Some(code), _) => code,
            (None, Some(e)) if e.is_application_error() => FAILURE_EXIT_CODE,
            _ => 0,
        }
    }
}
