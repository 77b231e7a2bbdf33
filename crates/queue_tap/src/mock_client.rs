//! In-memory queue client for tests
//!
//! Deliveries are fed through an mpsc channel and every ack/nack is recorded
//! with its delivery tag, so tests can assert the exact acknowledgement
//! sequence.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::client::{InboundMessage, MessageAcker, ProvisionPlan, QueueClient};
use crate::error::{QueueTapError, Result};

/// Outcome recorded for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Ack,
    Nack,
}

/// A message the test injects into the mock.
#[derive(Debug, Clone)]
pub struct MockDelivery {
    pub author: Option<String>,
    pub source: Option<String>,
    pub timestamp: Option<i64>,
    pub body: Bytes,
}

impl MockDelivery {
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self { author: None, source: None, timestamp: None, body: body.into() }
    }
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    closed: bool,
    fail_connect: bool,
    plan: Option<ProvisionPlan>,
    acks: Vec<(u64, AckOutcome)>,
}

/// Test-side handle: inject deliveries and inspect recorded state.
#[derive(Clone)]
pub struct MockQueueHandle {
    state: Arc<Mutex<MockState>>,
    deliveries: mpsc::UnboundedSender<MockDelivery>,
}

impl MockQueueHandle {
    pub fn deliver(&self, delivery: MockDelivery) {
        // Send failure just means the consumer already shut down.
        let _ = self.deliveries.send(delivery);
    }

    pub fn fail_next_connect(&self) {
        self.state.lock().unwrap().fail_connect = true;
    }

    pub fn connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn plan(&self) -> Option<ProvisionPlan> {
        self.state.lock().unwrap().plan.clone()
    }

    pub fn acks(&self) -> Vec<(u64, AckOutcome)> {
        self.state.lock().unwrap().acks.clone()
    }
}

/// In-memory [`QueueClient`].
pub struct MockQueueClient {
    state: Arc<Mutex<MockState>>,
    deliveries: mpsc::UnboundedReceiver<MockDelivery>,
    next_tag: u64,
}

impl MockQueueClient {
    pub fn new() -> (Self, MockQueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(MockState::default()));
        let handle = MockQueueHandle { state: Arc::clone(&state), deliveries: tx };
        (Self { state, deliveries: rx, next_tag: 1 }, handle)
    }
}

#[async_trait]
impl QueueClient for MockQueueClient {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_connect {
            state.fail_connect = false;
            return Err(QueueTapError::connect("mock connect failure"));
        }
        state.connected = true;
        state.closed = false;
        Ok(())
    }

    async fn provision(&mut self, plan: &ProvisionPlan) -> Result<()> {
        self.state.lock().unwrap().plan = Some(plan.clone());
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Option<InboundMessage>> {
        match self.deliveries.recv().await {
            Some(delivery) => {
                let tag = self.next_tag;
                self.next_tag += 1;
                Ok(Some(InboundMessage {
                    author: delivery.author,
                    source: delivery.source,
                    timestamp: delivery.timestamp,
                    body: delivery.body,
                    acker: Box::new(MockAcker { tag, state: Arc::clone(&self.state) }),
                }))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.closed = true;
        Ok(())
    }
}

struct MockAcker {
    tag: u64,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl MessageAcker for MockAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().acks.push((self.tag, AckOutcome::Ack));
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().acks.push((self.tag, AckOutcome::Nack));
        Ok(())
    }
}
