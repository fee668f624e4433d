//! Session control frames.
//!
//! Control frames travel on the host transport under the reserved
//! [`CONTROL_FRAME_KIND`](crate::constants::CONTROL_FRAME_KIND) and carry either
//! a signal from a fixed set or a terminal resize. Payloads are bincode-encoded.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Terminal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Signals a caller may deliver to the remote process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// SIGINT.
    Interrupt,
    /// SIGQUIT.
    Quit,
    /// SIGTERM.
    Terminate,
    /// SIGHUP.
    Hangup,
    /// SIGTSTP.
    Suspend,
}

impl SignalKind {
    /// Every signal kind, in wire order.
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Interrupt,
        SignalKind::Quit,
        SignalKind::Terminate,
        SignalKind::Hangup,
        SignalKind::Suspend,
    ];

    /// Lowercase name used in logs and by backends addressing signals by name.
    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Interrupt => "interrupt",
            SignalKind::Quit => "quit",
            SignalKind::Terminate => "terminate",
            SignalKind::Hangup => "hangup",
            SignalKind::Suspend => "suspend",
        }
    }

    /// Parse a lowercase signal name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// POSIX signal number.
    pub fn as_raw(self) -> i32 {
        match self {
            SignalKind::Interrupt => libc::SIGINT,
            SignalKind::Quit => libc::SIGQUIT,
            SignalKind::Terminate => libc::SIGTERM,
            SignalKind::Hangup => libc::SIGHUP,
            SignalKind::Suspend => libc::SIGTSTP,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An out-of-band session control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlFrame {
    /// Deliver a signal to the remote process.
    Signal(SignalKind),
    /// The caller's terminal changed size.
    Resize(TermSize),
}

impl ControlFrame {
    /// Encode the control payload (without the frame header or kind byte).
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Codec {
            message: format!("control frame serialization failed: {}", e),
        })
    }

    /// Decode a control payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        bincode::deserialize(payload).map_err(|e| Error::Codec {
            message: format!("control frame deserialization failed: {}", e),
        })
    }
}
