//! Backends shipped with the client.

mod local;
mod pty;

pub use local::LocalBackend;
pub use pty::{Pty, PtyReader, PtyWriter};
