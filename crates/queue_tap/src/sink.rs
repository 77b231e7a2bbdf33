//! Outbound AMQP sink
//!
//! Publishes records to a topic exchange with the record's source as the
//! routing key, carrying attribution in headers so a downstream queue tap
//! can reconstruct the record.

use std::sync::Mutex;

use async_trait::async_trait;
use contracts::{IngestError, Lifecycle, Record, Sink};
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::info;

#[derive(Debug, Clone)]
pub struct AmqpSinkConfig {
    pub name: String,
    pub uri: String,
    pub exchange: String,
    /// Prepended to the record source to form the routing key.
    pub routing_key_prefix: String,
}

impl AmqpSinkConfig {
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            exchange: exchange.into(),
            routing_key_prefix: String::new(),
        }
    }

    pub fn with_routing_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.routing_key_prefix = prefix.into();
        self
    }
}

pub struct AmqpSink {
    config: AmqpSinkConfig,
    state: Mutex<Option<(Connection, Channel)>>,
}

impl AmqpSink {
    pub fn new(config: AmqpSinkConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    fn channel(&self) -> Option<Channel> {
        self.state
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, channel)| channel.clone())
    }
}

#[async_trait]
impl Sink for AmqpSink {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn take(&self, record: Record) -> Result<(), IngestError> {
        let Some(channel) = self.channel() else {
            return Err(IngestError::sink_connection(
                &self.config.name,
                "sink is not enabled",
            ));
        };

        let routing_key = format!("{}{}", self.config.routing_key_prefix, record.source);

        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from("author"),
            AMQPValue::LongString(record.author.clone().into()),
        );
        headers.insert(
            ShortString::from("source"),
            AMQPValue::LongString(record.source.clone().into()),
        );
        let properties = BasicProperties::default()
            .with_timestamp(record.timestamp as u64)
            .with_delivery_mode(2)
            .with_headers(headers);

        channel
            .basic_publish(
                &self.config.exchange,
                &routing_key,
                BasicPublishOptions::default(),
                &record.content,
                properties,
            )
            .await
            .map_err(|e| IngestError::sink_write(&self.config.name, e.to_string()))?;
        Ok(())
    }

    fn lifecycle(&self) -> Option<&dyn Lifecycle> {
        Some(self)
    }
}

#[async_trait]
impl Lifecycle for AmqpSink {
    fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    async fn enable(&self) -> Result<(), IngestError> {
        if self.is_enabled() {
            return Ok(());
        }

        let connection = Connection::connect(&self.config.uri, ConnectionProperties::default())
            .await
            .map_err(|e| IngestError::sink_connection(&self.config.name, e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| IngestError::sink_connection(&self.config.name, e.to_string()))?;
        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| IngestError::sink_connection(&self.config.name, e.to_string()))?;

        info!(sink = %self.config.name, exchange = %self.config.exchange, "amqp sink connected");
        *self.state.lock().unwrap() = Some((connection, channel));
        Ok(())
    }

    async fn disable(&self) -> Result<(), IngestError> {
        let state = self.state.lock().unwrap().take();
        if let Some((connection, _channel)) = state {
            connection
                .close(200, "shutdown")
                .await
                .map_err(|e| IngestError::sink_connection(&self.config.name, e.to_string()))?;
        }
        Ok(())
    }
}
