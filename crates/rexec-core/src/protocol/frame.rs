//! Raw host transport frames.
//!
//! A frame is a kind byte plus an opaque payload. Only frames carrying the
//! reserved control kind are interpreted by rexec; everything else belongs to
//! whatever RPC layer shares the connection and is passed through untouched.

use bytes::Bytes;

use crate::constants::{
    CONTROL_FRAME_KIND, NOTIFICATION_FRAME_KIND, REQUEST_FRAME_KIND, RESPONSE_FRAME_KIND,
};
use crate::error::{Error, Result};

use super::control::ControlFrame;

/// Classification of a frame's kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// RPC request.
    Request,
    /// RPC response.
    Response,
    /// RPC notification.
    Notification,
    /// Session control frame (reserved discriminant).
    Control,
    /// Any other kind byte, carried opaquely.
    Other(u8),
}

impl FrameKind {
    /// Classify a raw kind byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            REQUEST_FRAME_KIND => FrameKind::Request,
            RESPONSE_FRAME_KIND => FrameKind::Response,
            NOTIFICATION_FRAME_KIND => FrameKind::Notification,
            CONTROL_FRAME_KIND => FrameKind::Control,
            other => FrameKind::Other(other),
        }
    }

    /// The raw kind byte.
    pub fn as_byte(self) -> u8 {
        match self {
            FrameKind::Request => REQUEST_FRAME_KIND,
            FrameKind::Response => RESPONSE_FRAME_KIND,
            FrameKind::Notification => NOTIFICATION_FRAME_KIND,
            FrameKind::Control => CONTROL_FRAME_KIND,
            FrameKind::Other(byte) => byte,
        }
    }
}

/// A single frame on the host transport.
///
/// The kind is stored as the raw byte so a frame that is passed through is
/// re-delivered exactly as it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: u8,
    payload: Bytes,
}

impl Frame {
    /// Build a frame from a raw kind byte and payload.
    pub fn new(kind: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Build an RPC request frame.
    pub fn request(payload: impl Into<Bytes>) -> Self {
        Self::new(REQUEST_FRAME_KIND, payload)
    }

    /// Build an RPC response frame.
    pub fn response(payload: impl Into<Bytes>) -> Self {
        Self::new(RESPONSE_FRAME_KIND, payload)
    }

    /// Build a control frame.
    pub fn control(control: &ControlFrame) -> Result<Self> {
        Ok(Self::new(CONTROL_FRAME_KIND, control.encode()?))
    }

    /// The raw kind byte.
    pub fn kind_byte(&self) -> u8 {
        self.kind
    }

    /// The classified kind.
    pub fn kind(&self) -> FrameKind {
        FrameKind::from_byte(self.kind)
    }

    /// Whether this frame carries the reserved control discriminant.
    pub fn is_control(&self) -> bool {
        self.kind == CONTROL_FRAME_KIND
    }

    /// The frame payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Decode the payload of a control frame.
    pub fn to_control(&self) -> Result<ControlFrame> {
        if !self.is_control() {
            return Err(Error::Codec {
                message: format!("frame kind {:#04x} is not a control frame", self.kind),
            });
        }
        ControlFrame::decode(&self.payload)
    }
}
