//! Pipe - sink and tap combo that forwards records unchanged

use std::sync::Arc;

use async_trait::async_trait;

use contracts::{IngestError, Record, Sink, TapConfig};

use crate::{Fanout, Tap};

/// Simple sink and tap combo that forwards all of its data without ever
/// altering it.
///
/// Useful for connecting multiple taps to the same set of sinks, or for
/// broadcasting one stream to many sinks through a single attachment point.
///
/// A pipe never synthesizes attribution: it only forwards records that are
/// already fully attributed, so it deliberately exposes no defaulting emit
/// path at all.
pub struct Pipe {
    fanout: Fanout,
}

impl Pipe {
    /// Create a pipe.
    ///
    /// The identity is fixed (`pipe`/`pipe`) and only ever appears in logs;
    /// it is never stamped on a record.
    pub fn new() -> Self {
        let config = TapConfig::new("pipe").with_author("pipe");
        Self {
            // Name is statically non-empty, construction cannot fail.
            fanout: Fanout::new(&config, &"pipe".into()).expect("static pipe config is valid"),
        }
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Tap for Pipe {
    fn source_name(&self) -> &str {
        self.fanout.source_name()
    }

    fn author_name(&self) -> &str {
        self.fanout.author_name()
    }

    fn attach_sink(&self, sink: Arc<dyn Sink>) {
        self.fanout.attach_sink(sink);
    }

    fn detach_sink(&self, sink: &Arc<dyn Sink>) {
        self.fanout.detach_sink(sink);
    }
}

#[async_trait]
impl Sink for Pipe {
    fn name(&self) -> &str {
        self.fanout.source_name()
    }

    async fn take(&self, record: Record) -> Result<(), IngestError> {
        self.fanout.emit_exact(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectSink {
        records: Mutex<Vec<Record>>,
    }

    #[async_trait]
    impl Sink for CollectSink {
        fn name(&self) -> &str {
            "collect"
        }

        async fn take(&self, record: Record) -> Result<(), IngestError> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pipe_forwards_records_unchanged() {
        let pipe = Pipe::new();
        let sink = Arc::new(CollectSink::default());
        pipe.attach_sink(sink.clone());

        let record = Record {
            author: "upstream-author".into(),
            source: "upstream-source".into(),
            timestamp: 1234,
            content: Bytes::from_static(b"payload"),
        };

        pipe.take(record.clone()).await.unwrap();

        // Round-trip identity on every field.
        assert_eq!(sink.records.lock().unwrap().as_slice(), &[record]);
    }

    #[tokio::test]
    async fn test_pipe_merges_multiple_upstreams() {
        let pipe = Arc::new(Pipe::new());
        let sink = Arc::new(CollectSink::default());
        pipe.attach_sink(sink.clone());

        for source in ["a", "b"] {
            let record = Record {
                author: "x".into(),
                source: source.into(),
                timestamp: 1,
                content: Bytes::new(),
            };
            let as_sink: Arc<dyn Sink> = pipe.clone();
            as_sink.take(record).await.unwrap();
        }

        let received = sink.records.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].source, "a");
        assert_eq!(received[1].source, "b");
    }
}
