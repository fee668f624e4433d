//! rexec-client: Interactive remote execution client.
//!
//! Provides:
//! - CLI argument parsing
//! - Clusters inventory and the local process backend
//! - Cluster routing and replica selection
//! - Tunnel establishment and stream coupling
//! - Caller terminal handling and OS signal events
//! - Host transport RPC handling
//! - Session orchestration

pub mod backend;
pub mod cli;
pub mod config;
pub mod coupler;
pub mod host;
pub mod router;
pub mod session;
pub mod terminal;
pub mod tunnel;

pub use backend::LocalBackend;
pub use cli::{Cli, CliLogFormat};
pub use config::{ClustersConfig, SessionConfig};
pub use coupler::{CallerIo, couple};
pub use host::{RpcResponder, connect_host};
pub use router::{ClusterRouter, candidates, select};
pub use session::{Attachment, SessionReport, SessionRunner};
pub use terminal::{RawModeGuard, SignalSource, stdin_is_tty, terminal_size};
pub use tunnel::{Tunnel, TunnelCloser, exec_spec};
