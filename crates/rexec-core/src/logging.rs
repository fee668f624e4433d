//! Tracing integration for structured logging.
//!
//! Provides logging setup with:
//! - Configurable verbosity levels
//! - Optional file output
//! - JSON or text format
//!
//! Logs always go to stderr or a file; stdout carries remote process output.

use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::Result;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Initialize the logging system.
///
/// # Arguments
///
/// * `verbosity` - Verbosity level (0=error, 1=warn, 2=info, 3=debug, 4+=trace)
/// * `log_file` - Optional path to write logs to file
/// * `format` - Output format (text or JSON)
///
/// `RUST_LOG` takes precedence over `verbosity` when set.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>, format: LogFormat) -> Result<()> {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rexec={},rexec_core={},rexec_client={}",
            level, level, level
        ))
    });

    let installed = match (log_file, format) {
        (None, LogFormat::Text) => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(verbosity >= 3)
                    .with_line_number(verbosity >= 3),
            )
            .try_init(),
        (None, LogFormat::Json) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (Some(path), LogFormat::Text) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_target(true)
                        .with_file(verbosity >= 3)
                        .with_line_number(verbosity >= 3),
                )
                .try_init()
        }
        (Some(path), LogFormat::Json) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(file))
                .try_init()
        }
    };

    installed.map_err(|e| crate::Error::Io(std::io::Error::other(e.to_string())))
}

/// Initialize logging with defaults for testing.
///
/// Silently ignores errors (logging may already be initialized).
pub fn init_test_logging() {
    let _ = init_logging(2, None, LogFormat::Text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn second_init_is_reported_not_fatal() {
        init_test_logging();
        // A subscriber is already installed by now; re-initializing must surface an error
        // rather than panic.
        assert!(init_logging(2, None, LogFormat::Text).is_err());
    }
}
