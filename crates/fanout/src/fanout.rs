//! Fanout - attach/detach/emit helper embedded by every concrete tap

use std::sync::{Arc, Mutex};

use metrics::counter;
use tracing::{error, warn};

use contracts::{AuthorDefault, IngestError, PartialRecord, Record, Sink, TapConfig};

/// Fan-out helper owned by a tap
///
/// Holds the tap's resolved identity and the set of attached sinks.
/// Delivery runs over a snapshot of the sink list taken at the start of each
/// emit, so attaching or detaching sinks while an emission is in progress
/// only affects later emits.
pub struct Fanout {
    author_name: String,
    source_name: String,
    sinks: Mutex<Vec<Arc<dyn Sink>>>,
}

impl Fanout {
    /// Create a fan-out helper from a tap configuration.
    ///
    /// The effective author is resolved here, once, and cached for the
    /// lifetime of the tap.
    ///
    /// # Errors
    /// Returns `ConfigValidation` when the tap name is empty.
    pub fn new(config: &TapConfig, default_author: &AuthorDefault) -> Result<Self, IngestError> {
        config.validate()?;

        Ok(Self {
            author_name: config.resolve_author(default_author),
            source_name: config.name.clone(),
            sinks: Mutex::new(Vec::new()),
        })
    }

    /// Source name stamped on records emitted through the defaulting path
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Author name stamped on records emitted through the defaulting path
    pub fn author_name(&self) -> &str {
        &self.author_name
    }

    /// Number of currently attached sinks
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    /// Make a sink receive data from this tap.
    ///
    /// Does nothing if the sink is already attached. Attaching a
    /// lifecycle-managed sink that reports itself disabled is a warning, not
    /// an error; data will still be forwarded and fail at the sink's
    /// discretion.
    pub fn attach_sink(&self, sink: Arc<dyn Sink>) {
        if let Some(lifecycle) = sink.lifecycle() {
            if !lifecycle.is_enabled() {
                warn!(
                    source = %self.source_name,
                    sink = %sink.name(),
                    "attaching a disabled sink; records forwarded to it may be dropped"
                );
            }
        }

        let mut sinks = self.sinks.lock().unwrap();
        if sinks.iter().any(|s| Arc::ptr_eq(s, &sink)) {
            return;
        }
        sinks.push(sink);
    }

    /// Stop a sink receiving data from this tap.
    ///
    /// Does nothing if the sink is not attached.
    pub fn detach_sink(&self, sink: &Arc<dyn Sink>) {
        let mut sinks = self.sinks.lock().unwrap();
        sinks.retain(|s| !Arc::ptr_eq(s, sink));
    }

    /// Broadcast data as this tap, filling unset fields from the tap's
    /// configuration and the current time.
    ///
    /// # Errors
    /// Every attached sink is attempted in attachment order regardless of
    /// failures; the first failure (if any) is returned after all sinks have
    /// been tried.
    pub async fn emit(&self, partial: PartialRecord) -> Result<(), IngestError> {
        let record = partial.resolve(&self.author_name, &self.source_name);
        self.emit_exact(record).await
    }

    /// Broadcast an already-fully-attributed record verbatim, bypassing
    /// defaulting.
    ///
    /// # Errors
    /// Same delivery policy as [`emit`](Self::emit).
    pub async fn emit_exact(&self, record: Record) -> Result<(), IngestError> {
        let snapshot: Vec<Arc<dyn Sink>> = self.sinks.lock().unwrap().clone();

        counter!("records_emitted_total", "source" => self.source_name.clone()).increment(1);

        let mut first_failure = None;
        for sink in snapshot {
            if let Err(e) = sink.take(record.clone()).await {
                counter!("sink_write_failures_total", "sink" => sink.name().to_string())
                    .increment(1);
                error!(
                    source = %self.source_name,
                    sink = %sink.name(),
                    error = %e,
                    "sink delivery failed"
                );
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("source_name", &self.source_name)
            .field("author_name", &self.author_name)
            .field("sinks", &self.sink_count())
            .finish()
    }
}
