//! CLI parsing functions and methods.

use std::path::PathBuf;
use std::time::Duration;

use rexec_core::protocol::ExecRequest;

use super::types::Cli;
use crate::config::SessionConfig;

impl Cli {
    /// The session request described by the arguments.
    pub fn exec_request(&self) -> ExecRequest {
        ExecRequest {
            compute_unit_name: self.unit.clone(),
            command: None,
            args: (!self.command.is_empty()).then(|| self.command.clone()),
            interactive: self.interactive,
            terminal: self.tty,
            replica: (!self.replica.is_empty()).then(|| self.replica.clone()),
        }
    }

    /// Inventory path: `--clusters` or the per-user default.
    pub fn clusters_path(&self) -> Option<PathBuf> {
        self.clusters.clone().or_else(default_clusters_path)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: self.connect_timeout,
            discovery_timeout: self.discovery_timeout,
            ..SessionConfig::default()
        }
    }
}

/// `$XDG_CONFIG_HOME/rexec/clusters.json`, falling back to `~/.config`.
pub fn default_clusters_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("rexec").join("clusters.json"))
}

/// Parse a duration like `10s`, `500ms`, `2m` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (value, unit) = s.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration '{}'", s))?;

    match unit {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        other => Err(format!("invalid duration unit '{}' (expected ms, s or m)", other)),
    }
}
