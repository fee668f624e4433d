//! Protocol and configuration constants for rexec.

use std::time::Duration;

// =============================================================================
// Wire Constants
// =============================================================================

/// Length of the frame length prefix (u32 little-endian).
pub const FRAME_HEADER_LEN: usize = 4;

/// Maximum frame body size (kind byte + payload), 16 MiB.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Reserved frame kind carrying session control frames.
pub const CONTROL_FRAME_KIND: u8 = 0xC5;

/// Frame kind for RPC requests.
pub const REQUEST_FRAME_KIND: u8 = 0x01;

/// Frame kind for RPC responses.
pub const RESPONSE_FRAME_KIND: u8 = 0x02;

/// Frame kind for RPC notifications.
pub const NOTIFICATION_FRAME_KIND: u8 = 0x03;

/// Depth of the outbound frame queue on a host connection.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

// =============================================================================
// Session Constants
// =============================================================================

/// Shell used when the request carries no command.
pub const DEFAULT_SHELL: &str = "sh";

/// Timeout for opening an exec tunnel.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single cluster's discovery query.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period for flushing remote output after the exit code arrives.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Buffer size of each byte pump.
pub const PUMP_BUFFER_SIZE: usize = 8 * 1024;

/// Exit code reported when a session fails before any remote exit code is known.
pub const FAILURE_EXIT_CODE: i32 = 1;
