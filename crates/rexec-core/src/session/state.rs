//! Session state machine.

use std::fmt;

use crate::cluster::Replica;
use crate::error::{Error, Result};
use crate::protocol::ExecRequest;

/// Random session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; 16]);

impl SessionId {
    pub fn new() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Establishing,
    Active,
    Closing,
    Closed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Establishing => "establishing",
            SessionStatus::Active => "active",
            SessionStatus::Closing => "closing",
            SessionStatus::Closed => "closed",
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Establishing, Active) | (Establishing, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote execution session, owned by the invocation that created it.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    request: ExecRequest,
    replica: Option<Replica>,
    status: SessionStatus,
    exit_code: Option<i32>,
}

impl Session {
    pub fn new(request: ExecRequest) -> Self {
        Self {
            id: SessionId::new(),
            request,
            replica: None,
            status: SessionStatus::Establishing,
            exit_code: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn request(&self) -> &ExecRequest {
        &self.request
    }

    pub fn unit(&self) -> &str {
        &self.request.compute_unit_name
    }

    pub fn replica(&self) -> Option<&Replica> {
        self.replica.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Fix the selected replica. Only allowed once, while establishing.
    pub fn bind_replica(&mut self, replica: Replica) -> Result<()> {
        if self.status != SessionStatus::Establishing {
            return Err(self.invalid("establishing"));
        }
        if let Some(bound) = &self.replica {
            return Err(Error::InvalidState {
                expected: "unbound replica".to_string(),
                actual: format!("bound to {}", bound.pod),
            });
        }
        self.replica = Some(replica);
        Ok(())
    }

    /// Establishing -> Active. Requires a bound replica.
    pub fn activate(&mut self) -> Result<()> {
        if self.replica.is_none() {
            return Err(Error::InvalidState {
                expected: "bound replica".to_string(),
                actual: "no replica".to_string(),
            });
        }
        self.transition(SessionStatus::Active)
    }

    /// Move to Closing, recording the exit code if known.
    pub fn begin_close(&mut self, exit_code: Option<i32>) -> Result<()> {
        self.transition(SessionStatus::Closing)?;
        if exit_code.is_some() {
            self.exit_code = exit_code;
        }
        Ok(())
    }

    /// Closing -> Closed.
    pub fn close(&mut self) -> Result<()> {
        self.transition(SessionStatus::Closed)
    }

    fn transition(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("state leading to {next}"),
                actual: self.status.to_string(),
            });
        }
        tracing::debug!(session = %self.id, from = %self.status, to = %next, "Session transition");
        self.status = next;
        Ok(())
    }

    fn invalid(&self, expected: &str) -> Error {
        Error::InvalidState {
            expected: expected.to_string(),
            actual: self.status.to_string(),
        }
    }
}
