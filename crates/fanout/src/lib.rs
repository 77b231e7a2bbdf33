//! # Fanout
//!
//! Tap/sink fan-out substrate.
//!
//! Responsibilities:
//! - `Fanout`: the attach/detach/emit helper every concrete tap embeds
//! - `Tap`: the capability trait for data producers
//! - `Pipe`: a tap+sink combo that forwards records unchanged

mod fanout;
mod pipe;
mod tap;

pub use contracts::{PartialRecord, Record, Sink};
pub use fanout::Fanout;
pub use pipe::Pipe;
pub use tap::Tap;
