//! # Queue Tap
//!
//! At-least-once queue consumer over AMQP.
//!
//! Responsibilities:
//! - Exchange/queue provisioning with declarative bindings
//! - Bounded in-flight concurrency via prefetch
//! - Per-message optional transform with ack/nack decisions
//! - `AmqpSink`: publishing records back to a topic exchange
//!
//! The transport sits behind the [`QueueClient`] trait with a lapin-backed
//! implementation (feature `real-amqp`, on by default) and a mock for tests.

mod client;
mod config;
mod consumer;
mod error;
pub mod mock_client;

#[cfg(feature = "real-amqp")]
mod lapin_client;
#[cfg(feature = "real-amqp")]
mod sink;

pub use client::{InboundMessage, MessageAcker, ProvisionPlan, QueueClient};
pub use config::{AmqpTapConfig, QueueBind, Transform, DEFAULT_PREFETCH};
pub use consumer::AmqpTap;
pub use error::{QueueTapError, Result};
pub use mock_client::{AckOutcome, MockDelivery, MockQueueClient, MockQueueHandle};

#[cfg(feature = "real-amqp")]
pub use lapin_client::LapinQueueClient;
#[cfg(feature = "real-amqp")]
pub use sink::{AmqpSink, AmqpSinkConfig};
