//! Inbound exec request.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SHELL;

/// A caller's request to open an interactive exec session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    /// Logical compute unit to exec into.
    pub compute_unit_name: String,
    /// Command line; the default shell when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Exact argv. Takes precedence over `command` and is never re-split.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Attach the caller's stdin.
    #[serde(default)]
    pub interactive: bool,
    /// Allocate a pseudo-terminal.
    #[serde(default)]
    pub terminal: bool,
    /// Restrict selection to these replica (pod) identifiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica: Option<Vec<String>>,
}

impl ExecRequest {
    /// Create a request for the default shell with no replica filter.
    pub fn new(compute_unit_name: impl Into<String>) -> Self {
        Self {
            compute_unit_name: compute_unit_name.into(),
            command: None,
            args: None,
            interactive: false,
            terminal: false,
            replica: None,
        }
    }

    /// The command as argv: `args` verbatim, else `command` whitespace-split,
    /// else the default shell.
    pub fn argv(&self) -> Vec<String> {
        if let Some(args) = self.args.as_ref().filter(|args| !args.is_empty()) {
            return args.clone();
        }
        let argv: Vec<String> = self
            .command
            .as_deref()
            .unwrap_or_default()
            .split_ascii_whitespace()
            .map(String::from)
            .collect();

        if argv.is_empty() {
            vec![DEFAULT_SHELL.to_string()]
        } else {
            argv
        }
    }

    /// The replica filter, if one was given. An empty list means no filter.
    pub fn replica_filter(&self) -> Option<&[String]> {
        self.replica
            .as_deref()
            .filter(|replicas| !replicas.is_empty())
    }
}
