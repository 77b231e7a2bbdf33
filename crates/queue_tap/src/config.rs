//! Queue tap configuration

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use contracts::{IngestError, PartialRecord, Record, TapConfig};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::client::ProvisionPlan;

/// Default prefetch: one unacknowledged delivery at a time.
pub const DEFAULT_PREFETCH: u16 = 1;

/// Async per-delivery transform.
///
/// Receives the resolved inbound record and returns:
/// - `Ok(Some(partial))`: emit the partial record downstream, then ack
/// - `Ok(None)`: suppress the message, ack anyway
/// - `Err(_)`: processing failed, nack for redelivery
pub type Transform = Arc<
    dyn Fn(Record) -> BoxFuture<'static, Result<Option<PartialRecord>, Box<dyn Error + Send + Sync>>>
        + Send
        + Sync,
>;

/// One routing binding: subscribe the consumer queue to a pattern on an
/// exchange. When `exchange` is `None`, the tap's own exchange is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBind {
    pub exchange: Option<String>,
    pub pattern: String,
}

impl QueueBind {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { exchange: None, pattern: pattern.into() }
    }

    pub fn on_exchange(exchange: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self { exchange: Some(exchange.into()), pattern: pattern.into() }
    }
}

/// Configuration for an AMQP queue tap.
#[derive(Clone)]
pub struct AmqpTapConfig {
    pub tap: TapConfig,
    pub uri: String,
    pub exchange: String,
    pub queue_name: String,
    pub queue_binds: Vec<QueueBind>,
    pub prefetch: u16,
    pub queue_expires: Option<Duration>,
    pub transform: Option<Transform>,
}

impl AmqpTapConfig {
    pub fn new(
        tap: TapConfig,
        uri: impl Into<String>,
        exchange: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            tap,
            uri: uri.into(),
            exchange: exchange.into(),
            queue_name: queue_name.into(),
            queue_binds: Vec::new(),
            prefetch: DEFAULT_PREFETCH,
            queue_expires: None,
            transform: None,
        }
    }

    pub fn with_bind(mut self, bind: QueueBind) -> Self {
        self.queue_binds.push(bind);
        self
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_queue_expires(mut self, expires: Duration) -> Self {
        self.queue_expires = Some(expires);
        self
    }

    pub fn with_transform<F, Fut>(mut self, transform: F) -> Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<PartialRecord>, Box<dyn Error + Send + Sync>>>
            + Send
            + 'static,
    {
        self.transform = Some(Arc::new(move |record| transform(record).boxed()));
        self
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        self.tap.validate()?;
        if self.uri.is_empty() {
            return Err(IngestError::config_validation("uri", "AMQP URI must not be empty"));
        }
        if self.exchange.is_empty() {
            return Err(IngestError::config_validation(
                "exchange",
                "exchange name must not be empty",
            ));
        }
        if self.queue_name.is_empty() {
            return Err(IngestError::config_validation(
                "queue_name",
                "queue name must not be empty",
            ));
        }
        if self.prefetch == 0 {
            return Err(IngestError::config_validation(
                "prefetch",
                "prefetch must be at least 1",
            ));
        }
        for bind in &self.queue_binds {
            if bind.pattern.is_empty() {
                return Err(IngestError::config_validation(
                    "queue_binds",
                    "binding pattern must not be empty",
                ));
            }
        }
        Ok(())
    }

    /// Resolve the declaration plan: bindings without an explicit exchange
    /// bind against the tap's own exchange.
    pub fn provision_plan(&self) -> ProvisionPlan {
        ProvisionPlan {
            exchange: self.exchange.clone(),
            queue_name: self.queue_name.clone(),
            bindings: self
                .queue_binds
                .iter()
                .map(|b| {
                    (
                        b.exchange.clone().unwrap_or_else(|| self.exchange.clone()),
                        b.pattern.clone(),
                    )
                })
                .collect(),
            prefetch: self.prefetch,
            queue_expires: self.queue_expires,
        }
    }
}

impl fmt::Debug for AmqpTapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpTapConfig")
            .field("tap", &self.tap)
            .field("uri", &self.uri)
            .field("exchange", &self.exchange)
            .field("queue_name", &self.queue_name)
            .field("queue_binds", &self.queue_binds)
            .field("prefetch", &self.prefetch)
            .field("queue_expires", &self.queue_expires)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AmqpTapConfig {
        AmqpTapConfig::new(
            TapConfig::new("events"),
            "amqp://localhost:5672",
            "ingest",
            "events-queue",
        )
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_zero_prefetch_rejected() {
        let config = base_config().with_prefetch(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_bind_pattern_rejected() {
        let config = base_config().with_bind(QueueBind::new(""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_defaults_to_own_exchange() {
        let config = base_config()
            .with_bind(QueueBind::new("telemetry.#"))
            .with_bind(QueueBind::on_exchange("other", "alerts.*"));
        let plan = config.provision_plan();
        assert_eq!(
            plan.bindings,
            vec![
                ("ingest".to_string(), "telemetry.#".to_string()),
                ("other".to_string(), "alerts.*".to_string()),
            ]
        );
    }

    #[test]
    fn test_default_prefetch_is_one() {
        assert_eq!(base_config().provision_plan().prefetch, 1);
    }
}
