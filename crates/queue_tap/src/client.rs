//! Queue transport abstraction
//!
//! Abstracts the AMQP transport so the consumer logic can run against a real
//! broker or a mock in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Everything the transport must declare before consuming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    /// The consumer's own topic exchange (durable, not auto-deleted)
    pub exchange: String,

    /// Durable queue to consume from
    pub queue_name: String,

    /// Resolved `(source exchange, routing pattern)` bindings
    pub bindings: Vec<(String, String)>,

    /// Maximum unacknowledged deliveries in flight; the sole back-pressure
    /// mechanism
    pub prefetch: u16,

    /// Optional queue expiry
    pub queue_expires: Option<Duration>,
}

/// One delivered message, before record resolution
pub struct InboundMessage {
    /// `author` header, when the publisher set one
    pub author: Option<String>,

    /// `source` header, when the publisher set one
    pub source: Option<String>,

    /// Publish timestamp, milliseconds since the UNIX epoch
    pub timestamp: Option<i64>,

    /// Message body
    pub body: Bytes,

    /// Acknowledgement handle for this delivery
    pub acker: Box<dyn MessageAcker>,
}

/// Consuming acknowledgement handle
///
/// Both operations take `self`, so exactly one of {ack, nack} can ever be
/// issued per delivery; that is the at-least-once contract, enforced by move
/// semantics rather than convention.
#[async_trait]
pub trait MessageAcker: Send {
    /// Positively acknowledge: the delivery is consumed.
    async fn ack(self: Box<Self>) -> Result<()>;

    /// Negatively acknowledge: the delivery is returned for redelivery.
    async fn nack(self: Box<Self>) -> Result<()>;
}

/// Queue transport trait
///
/// Mirrors the lifecycle of one inbound subscription: connect, provision,
/// consume, close. In-flight unacknowledged deliveries at close time are
/// returned by the broker, not tracked locally.
#[async_trait]
pub trait QueueClient: Send {
    /// Establish the transport connection and open one logical channel.
    async fn connect(&mut self) -> Result<()>;

    /// Declare the exchange, queue and bindings, and apply prefetch.
    async fn provision(&mut self, plan: &ProvisionPlan) -> Result<()>;

    /// Wait for the next delivery; `None` means the subscription ended.
    async fn next_delivery(&mut self) -> Result<Option<InboundMessage>>;

    /// Close the transport connection.
    async fn close(&mut self) -> Result<()>;
}
