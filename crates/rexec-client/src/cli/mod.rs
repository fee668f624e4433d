//! Client CLI implementation.
//!
//! Provides command-line argument parsing using clap.

mod parsing;
mod types;


pub use parsing::{default_clusters_path, parse_duration};
pub use types::*;
