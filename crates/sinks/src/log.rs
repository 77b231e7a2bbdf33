use async_trait::async_trait;
use contracts::{IngestError, Record, Sink};
use tracing::info;

const PREVIEW_LIMIT: usize = 128;

/// Logs every record it receives. Mostly useful in demos and while wiring
/// up a new pipeline.
#[derive(Debug, Clone)]
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn take(&self, record: Record) -> Result<(), IngestError> {
        let preview = String::from_utf8_lossy(
            &record.content[..record.content.len().min(PREVIEW_LIMIT)],
        )
        .into_owned();
        info!(
            sink = %self.name,
            source = %record.source,
            author = %record.author,
            timestamp = record.timestamp,
            bytes = record.content.len(),
            preview = %preview,
            "record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_log_sink_accepts_any_record() {
        let sink = LogSink::default();
        let record = Record {
            author: "host-a".into(),
            source: "events".into(),
            timestamp: 0,
            content: Bytes::from_static(&[0xff, 0xfe]),
        };
        assert!(sink.take(record).await.is_ok());
        assert_eq!(sink.name(), "log");
    }
}
