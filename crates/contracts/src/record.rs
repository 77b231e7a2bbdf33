//! Record / PartialRecord - the unit of data flowing through the pipeline

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Current time in milliseconds since the UNIX epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A fully-attributed, immutable unit of ingested data.
///
/// Once constructed, a record is never mutated; taps hand clones to each
/// attached sink. `content` is an opaque payload the pipeline never
/// interprets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Who created this piece of data.
    ///
    /// Trusted only when the producing channel is trusted; taps receiving
    /// data from remote instances should validate this value.
    pub author: String,

    /// What system or tap instance this data came from.
    pub source: String,

    /// Creation time, milliseconds since the UNIX epoch.
    pub timestamp: i64,

    /// The actual data (zero-copy).
    pub content: Bytes,
}

/// Newly created data, possibly with unattributed fields.
///
/// Taps accept a `PartialRecord` and fill in `author`/`source`/`timestamp`
/// from their own configuration and the current time before broadcasting.
/// Only `content` is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialRecord {
    /// Author override; defaults to the tap's configured author.
    pub author: Option<String>,

    /// Source override; defaults to the tap's configured source name.
    pub source: Option<String>,

    /// Creation time override, milliseconds since the UNIX epoch.
    /// Defaults to now.
    pub timestamp: Option<i64>,

    /// The actual data.
    pub content: Bytes,
}

impl PartialRecord {
    /// Create a partial record carrying only a payload.
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Set the author override.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set the source override.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the timestamp override.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Resolve into a full record, filling unset fields from the given
    /// defaults and the current time.
    ///
    /// Explicit fields always win over defaults.
    pub fn resolve(self, author: &str, source: &str) -> Record {
        Record {
            author: self.author.unwrap_or_else(|| author.to_string()),
            source: self.source.unwrap_or_else(|| source.to_string()),
            timestamp: self.timestamp.unwrap_or_else(now_millis),
            content: self.content,
        }
    }
}

impl From<Record> for PartialRecord {
    fn from(record: Record) -> Self {
        Self {
            author: Some(record.author),
            source: Some(record.source),
            timestamp: Some(record.timestamp),
            content: record.content,
        }
    }
}
