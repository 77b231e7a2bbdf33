//! Real AMQP transport backed by lapin

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tracing::debug;

use crate::client::{InboundMessage, MessageAcker, ProvisionPlan, QueueClient};
use crate::error::{QueueTapError, Result};

/// [`QueueClient`] over a real AMQP broker.
pub struct LapinQueueClient {
    uri: String,
    consumer_tag: String,
    connection: Option<Connection>,
    channel: Option<Channel>,
    consumer: Option<Consumer>,
}

impl LapinQueueClient {
    pub fn new(uri: impl Into<String>, consumer_tag: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            consumer_tag: consumer_tag.into(),
            connection: None,
            channel: None,
            consumer: None,
        }
    }

    fn channel(&self) -> Result<&Channel> {
        self.channel
            .as_ref()
            .ok_or_else(|| QueueTapError::connect("channel not open"))
    }
}

#[async_trait]
impl QueueClient for LapinQueueClient {
    async fn connect(&mut self) -> Result<()> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| QueueTapError::connect(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| QueueTapError::connect(e.to_string()))?;
        self.connection = Some(connection);
        self.channel = Some(channel);
        Ok(())
    }

    async fn provision(&mut self, plan: &ProvisionPlan) -> Result<()> {
        let channel = self.channel()?;

        let exchange_options = ExchangeDeclareOptions {
            durable: true,
            ..Default::default()
        };
        channel
            .exchange_declare(
                &plan.exchange,
                ExchangeKind::Topic,
                exchange_options,
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueTapError::provision(&plan.exchange, e.to_string()))?;

        // Source exchanges we bind against must also exist.
        for (exchange, _) in &plan.bindings {
            if exchange != &plan.exchange {
                channel
                    .exchange_declare(
                        exchange,
                        ExchangeKind::Topic,
                        exchange_options,
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| QueueTapError::provision(exchange, e.to_string()))?;
            }
        }

        let mut queue_args = FieldTable::default();
        if let Some(expires) = plan.queue_expires {
            queue_args.insert(
                ShortString::from("x-expires"),
                AMQPValue::LongLongInt(expires.as_millis() as i64),
            );
        }
        channel
            .queue_declare(
                &plan.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                queue_args,
            )
            .await
            .map_err(|e| QueueTapError::provision(&plan.queue_name, e.to_string()))?;

        for (exchange, pattern) in &plan.bindings {
            channel
                .queue_bind(
                    &plan.queue_name,
                    exchange,
                    pattern,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| QueueTapError::provision(&plan.queue_name, e.to_string()))?;
            debug!(queue = %plan.queue_name, exchange = %exchange, pattern = %pattern, "queue bound");
        }

        channel
            .basic_qos(plan.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| QueueTapError::provision(&plan.queue_name, e.to_string()))?;

        let consumer = channel
            .basic_consume(
                &plan.queue_name,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueTapError::consume(e.to_string()))?;
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Option<InboundMessage>> {
        let consumer = self
            .consumer
            .as_mut()
            .ok_or_else(|| QueueTapError::consume("consumer not started"))?;

        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(into_inbound(delivery))),
            Some(Err(e)) => Err(QueueTapError::consume(e.to_string())),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.consumer = None;
        self.channel = None;
        if let Some(connection) = self.connection.take() {
            connection
                .close(200, "shutdown")
                .await
                .map_err(|e| QueueTapError::connect(e.to_string()))?;
        }
        Ok(())
    }
}

fn into_inbound(delivery: Delivery) -> InboundMessage {
    let author = header_string(&delivery, "author");
    let source = header_string(&delivery, "source");
    // Publish timestamps are carried as milliseconds and passed through
    // without unit conversion.
    let timestamp = delivery.properties.timestamp().map(|ts| ts as i64);
    let acker = LapinAcker {
        acker: delivery.acker.clone(),
    };

    InboundMessage {
        author,
        source,
        timestamp,
        body: delivery.data.into(),
        acker: Box::new(acker),
    }
}

fn header_string(delivery: &Delivery, name: &str) -> Option<String> {
    let headers = delivery.properties.headers().as_ref()?;
    match headers.inner().get(&ShortString::from(name))? {
        AMQPValue::LongString(s) => Some(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        _ => None,
    }
}

struct LapinAcker {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl MessageAcker for LapinAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| QueueTapError::acknowledge(e.to_string()))
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        self.acker
            .nack(BasicNackOptions {
                requeue: true,
                ..Default::default()
            })
            .await
            .map_err(|e| QueueTapError::acknowledge(e.to_string()))
    }
}
