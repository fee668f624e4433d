//! rexec-test-utils: Test infrastructure for rexec.
//!
//! Provides:
//! - MockBackend: scripted cluster backend with recorded exec calls
//! - MockTunnel: remote end of an in-memory exec channel
//! - MockHost: remote end of an in-memory host transport

mod mock_backend;
mod mock_host;
mod mock_tunnel;

pub use mock_backend::{MockBackend, replica, unit};
pub use mock_host::{MockHost, host_transport_pair};
pub use mock_tunnel::MockTunnel;
