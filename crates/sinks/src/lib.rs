//! # Sinks
//!
//! File and log sinks for ingested records. Both implement the `Sink`
//! contract; `FileSink` is lifecycle-managed (the file is opened on
//! `enable`), `LogSink` is always ready.

mod file;
mod log;

pub use file::{FileSink, FileSinkConfig, PayloadMode};
pub use log::LogSink;
