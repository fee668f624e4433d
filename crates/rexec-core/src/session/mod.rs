//! Session lifecycle: state machine and finalizer.

mod finalizer;
mod state;

pub use finalizer::{ExitCode, ExitHook, Finalizer, ProcessExit};
pub use state::{Session, SessionId, SessionStatus};
