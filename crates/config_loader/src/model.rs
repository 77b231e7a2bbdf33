//! Declarative pipeline description

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level pipeline blueprint: taps, sinks and the wiring between them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PipelineBlueprint {
    /// Fallback author for taps that do not set one; when absent the
    /// runtime falls back to `INGESTER_AUTHOR` or `localhost`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_author: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub taps: TapsSection,

    #[serde(default)]
    #[validate(nested)]
    pub sinks: SinksSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TapsSection {
    #[serde(default)]
    #[validate(nested)]
    pub websocket: Vec<WebSocketTapSpec>,

    #[serde(default)]
    #[validate(nested)]
    pub amqp: Vec<AmqpTapSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SinksSection {
    #[serde(default)]
    #[validate(nested)]
    pub file: Vec<FileSinkSpec>,

    #[serde(default)]
    #[validate(nested)]
    pub log: Vec<LogSinkSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WebSocketTapSpec {
    #[validate(length(min = 1, message = "tap name cannot be empty"))]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[validate(length(min = 1, message = "url cannot be empty"))]
    pub url: String,

    /// Missing means the 10s default; 0 disables the keep-alive probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_keep_alive_ms: Option<u64>,

    /// Missing or 0 disables the silence watchdog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_kill_ms: Option<u64>,

    /// Names of declared sinks this tap feeds.
    #[serde(default)]
    pub sinks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AmqpTapSpec {
    #[validate(length(min = 1, message = "tap name cannot be empty"))]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[validate(length(min = 1, message = "uri cannot be empty"))]
    pub uri: String,

    #[validate(length(min = 1, message = "exchange cannot be empty"))]
    pub exchange: String,

    #[validate(length(min = 1, message = "queue_name cannot be empty"))]
    pub queue_name: String,

    #[serde(default)]
    #[validate(nested)]
    pub binds: Vec<QueueBindSpec>,

    #[serde(default = "default_prefetch")]
    #[validate(range(min = 1, message = "prefetch must be at least 1"))]
    pub prefetch: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_expires_ms: Option<u64>,

    #[serde(default)]
    pub sinks: Vec<String>,
}

fn default_prefetch() -> u16 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct QueueBindSpec {
    /// Source exchange; the tap's own exchange when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,

    #[validate(length(min = 1, message = "binding pattern cannot be empty"))]
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct FileSinkSpec {
    #[validate(length(min = 1, message = "sink name cannot be empty"))]
    pub name: String,

    /// Target path; `$t` is replaced with epoch milliseconds at open time.
    #[validate(length(min = 1, message = "path cannot be empty"))]
    pub path: String,

    #[serde(default)]
    pub mode: FilePayloadMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePayloadMode {
    Text,
    #[default]
    Binary,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LogSinkSpec {
    #[validate(length(min = 1, message = "sink name cannot be empty"))]
    pub name: String,
}

impl PipelineBlueprint {
    /// Names of every declared sink, in declaration order.
    pub fn sink_names(&self) -> impl Iterator<Item = &str> {
        self.sinks
            .file
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.sinks.log.iter().map(|s| s.name.as_str()))
    }

    /// Names of every declared tap, in declaration order.
    pub fn tap_names(&self) -> impl Iterator<Item = &str> {
        self.taps
            .websocket
            .iter()
            .map(|t| t.name.as_str())
            .chain(self.taps.amqp.iter().map(|t| t.name.as_str()))
    }
}
