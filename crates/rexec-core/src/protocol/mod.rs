//! Protocol module for the rexec host transport.
//!
//! This module provides:
//! - Raw frames and frame kinds
//! - Length-prefixed frame codec
//! - Control frames (signals, resizes) carried under a reserved kind
//! - The inbound exec request

mod codec;
mod control;
mod frame;
mod request;

#[cfg(test)]
mod proptest;

pub use codec::FrameCodec;
pub use control::{ControlFrame, SignalKind, TermSize};
pub use frame::{Frame, FrameKind};
pub use request::ExecRequest;
