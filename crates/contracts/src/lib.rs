//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are
//! prohibited.
//!
//! ## Time Model
//! - Record timestamps are integer milliseconds since the UNIX epoch
//! - A record's timestamp is its creation time at the producing tap

mod error;
mod record;
mod sink;
mod tap_config;

pub use error::*;
pub use record::*;
pub use sink::*;
pub use tap_config::*;
