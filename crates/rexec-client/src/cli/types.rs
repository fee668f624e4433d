//! CLI types and struct definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for rexec_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => rexec_core::LogFormat::Text,
            CliLogFormat::Json => rexec_core::LogFormat::Json,
        }
    }
}

/// Run a command inside a replica of a compute unit.
#[derive(Debug, Parser)]
#[command(
    name = "rexec",
    version,
    about = "Interactive remote execution against compute-unit replicas"
)]
pub struct Cli {
    /// Compute unit to attach to
    #[arg(value_name = "UNIT")]
    pub unit: String,

    /// Command to run in the replica (default: sh)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,

    /// Attach stdin
    #[arg(short = 'i', long)]
    pub interactive: bool,

    /// Allocate a pseudo-terminal
    #[arg(short = 't', long = "tty")]
    pub tty: bool,

    /// Restrict selection to these replicas (repeatable)
    #[arg(short = 'r', long = "replica", action = ArgAction::Append, value_name = "POD")]
    pub replica: Vec<String>,

    /// Clusters inventory file
    #[arg(long = "clusters", value_name = "PATH")]
    pub clusters: Option<PathBuf>,

    /// Host transport socket
    #[arg(long = "host-socket", env = "REXEC_HOST_SOCKET", value_name = "PATH")]
    pub host_socket: Option<PathBuf>,

    /// Tunnel establishment timeout (e.g. 10s, 500ms)
    #[arg(
        long = "connect-timeout",
        value_parser = super::parsing::parse_duration,
        default_value = "10s",
        value_name = "DURATION"
    )]
    pub connect_timeout: Duration,

    /// Per-cluster discovery timeout
    #[arg(
        long = "discovery-timeout",
        value_parser = super::parsing::parse_duration,
        default_value = "10s",
        value_name = "DURATION"
    )]
    pub discovery_timeout: Duration,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}
