//! Tap trait - data producer capability

use std::sync::Arc;

use contracts::Sink;

/// Data producer trait
///
/// A tap owns a set of attached sinks and broadcasts every record it
/// produces to all of them. Concrete taps embed a [`Fanout`](crate::Fanout)
/// and delegate to it; there is no base-class style shared state.
pub trait Tap: Send + Sync {
    /// Source name stamped on records this tap produces
    fn source_name(&self) -> &str;

    /// Author name stamped on records this tap produces
    fn author_name(&self) -> &str;

    /// Make a sink receive data from this tap (idempotent)
    fn attach_sink(&self, sink: Arc<dyn Sink>);

    /// Stop a sink receiving data from this tap (idempotent)
    fn detach_sink(&self, sink: &Arc<dyn Sink>);
}
