//! Host transport abstractions.
//!
//! The host transport is a single framed connection shared between ordinary
//! RPC traffic and session control frames:
//! - [`Dispatcher`]: ordered inbound handler chain with one interceptor slot
//! - [`ControlInterceptor`]: consumes control frames into an event listener
//! - [`HostConnection`]: framed reader/writer tasks over any async byte stream

mod connection;
mod dispatch;
mod intercept;

pub use connection::{FrameSender, HostConnection};
pub use dispatch::{Dispatcher, FrameHandler, FrameInterceptor, InterceptGuard, Intercepted};
pub use intercept::ControlInterceptor;
