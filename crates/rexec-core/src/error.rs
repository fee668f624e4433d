//! Error types for rexec-core.

use thiserror::Error;

/// Main error type for rexec operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No compute unit, no running replica, or the replica filter matched nothing.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Transport failure talking to a backend cluster.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// An interceptor is already installed on the transport.
    #[error("transport already intercepted")]
    AlreadyIntercepted,

    /// The backend rejected the exec request. The message is the backend's own.
    #[error("{message}")]
    RemoteExec { message: String },

    /// The session was cancelled.
    #[error("session aborted")]
    Aborted,

    /// Malformed frame on the host transport.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Invalid state transition.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl Error {
    /// Returns false for cancellation, which ends a session without being a failure.
    pub fn is_application_error(&self) -> bool {
        !matches!(self, Error::Aborted)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            message: message.into(),
        }
    }
}

/// Convenience result type for rexec operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_not_found() {
        let err = Error::NotFound {
            message: "compute unit worker has no running replica".into(),
        };
        assert_eq!(
            err.to_string(),
            "not found: compute unit worker has no running replica"
        );
    }

    #[test]
    fn remote_exec_is_surfaced_verbatim() {
        let err = Error::RemoteExec {
            message: "container \"sidecar\" not found in pod web-1".into(),
        };
        assert_eq!(err.to_string(), "container \"sidecar\" not found in pod web-1");
    }

    #[test]
    fn error_display_invalid_state() {
        let err = Error::InvalidState {
            expected: "Active".into(),
            actual: "Closed".into(),
        };
        assert_eq!(err.to_string(), "invalid state: expected Active, got Closed");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn aborted_is_not_an_application_error() {
        assert!(!Error::Aborted.is_application_error());
        assert!(Error::AlreadyIntercepted.is_application_error());
        assert!(Error::not_found("x").is_application_error());
    }
}
