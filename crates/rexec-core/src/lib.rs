//! rexec-core: Shared library for rexec sessions.
//!
//! This crate provides:
//! - Host transport frame format and codec (including control frames)
//! - Frame dispatch with an insertable interceptor slot
//! - Cluster/replica model and the backend exec interface
//! - Event listener adapter (latest-wins control event sequence)
//! - Session state machine and finalizer
//! - Logging setup

pub mod backend;
pub mod cluster;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use logging::{LogFormat, init_logging};
