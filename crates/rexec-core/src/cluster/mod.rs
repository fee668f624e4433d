//! Compute unit and replica model.
//!
//! Replicas are discovered fresh for every session and never cached.

mod types;

pub use types::{ClusterId, ComputeUnit, Replica, ReplicaPhase};
