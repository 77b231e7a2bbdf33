//! Sink trait - data consumer interface
//!
//! Defines the abstract interface for sinks, plus the optional `Lifecycle`
//! capability for sinks and taps that manage an external resource.

use async_trait::async_trait;

use crate::{IngestError, Record};

/// Data consumer trait
///
/// All sink implementations must implement this trait. Sinks are shared
/// (`Arc<dyn Sink>`) and may be attached to many taps at once, so `take`
/// borrows immutably; implementations use interior mutability where needed.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Accept one record
    ///
    /// # Errors
    /// Returns write error (should include context). A failing sink never
    /// stops delivery to the other sinks attached to the same tap.
    async fn take(&self, record: Record) -> Result<(), IngestError>;

    /// Narrow to the optional lifecycle capability.
    ///
    /// Sinks backed by an external resource (file, broker connection)
    /// return `Some(self)` here so taps can warn when asked to forward data
    /// to a sink that is currently disabled.
    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        None
    }
}

/// Optional lifecycle capability for resource-backed sinks and taps
///
/// `enable` and `disable` are idempotent; calling either twice in a row is
/// not an error.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Whether the underlying resource is currently usable
    fn is_enabled(&self) -> bool;

    /// Acquire the underlying resource
    async fn enable(&self) -> Result<(), IngestError>;

    /// Release the underlying resource
    async fn disable(&self) -> Result<(), IngestError>;
}
