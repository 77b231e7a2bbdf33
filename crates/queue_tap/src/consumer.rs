//! AMQP queue tap
//!
//! Consumes deliveries one at a time and feeds them through an optional
//! async transform into the fan-out. Acknowledgement is decided per
//! delivery: processed messages are acked, failed ones are nacked for
//! redelivery. Back-pressure comes solely from broker prefetch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use contracts::{now_millis, AuthorDefault, IngestError, Lifecycle, Record, Sink};
use fanout::{Fanout, Tap};
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{InboundMessage, QueueClient};
use crate::config::{AmqpTapConfig, Transform};

struct Worker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A tap fed by an AMQP queue.
///
/// Generic over the transport so the consumption logic is testable without a
/// broker; `AmqpTap::new` wires in the real client.
pub struct AmqpTap<C: QueueClient + 'static> {
    config: AmqpTapConfig,
    fanout: Arc<Fanout>,
    client: Arc<tokio::sync::Mutex<C>>,
    enabled: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

#[cfg(feature = "real-amqp")]
impl AmqpTap<crate::lapin_client::LapinQueueClient> {
    /// Build a tap backed by a real AMQP connection.
    pub fn new(
        config: AmqpTapConfig,
        default_author: &AuthorDefault,
    ) -> Result<Self, IngestError> {
        let client = crate::lapin_client::LapinQueueClient::new(&config.uri, &config.queue_name);
        Self::with_client(config, default_author, client)
    }
}

impl<C: QueueClient + 'static> AmqpTap<C> {
    /// Build a tap over an arbitrary transport.
    pub fn with_client(
        config: AmqpTapConfig,
        default_author: &AuthorDefault,
        client: C,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        let fanout = Fanout::new(&config.tap, default_author)?;
        Ok(Self {
            config,
            fanout: Arc::new(fanout),
            client: Arc::new(tokio::sync::Mutex::new(client)),
            enabled: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }
}

impl<C: QueueClient + 'static> Tap for AmqpTap<C> {
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
impl<C: QueueClient + 'static> Lifecycle for AmqpTap<C> {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn enable(&self) -> Result<(), IngestError> {
        {
            let worker = self.worker.lock().unwrap();
            if let Some(worker) = worker.as_ref() {
                if !worker.handle.is_finished() {
                    warn!(source = self.fanout.source_name(), "queue tap already enabled");
                    return Ok(());
                }
            }
        }

        let plan = self.config.provision_plan();
        {
            let mut client = self.client.lock().await;
            client.connect().await?;
            client.provision(&plan).await?;
        }
        info!(
            source = self.fanout.source_name(),
            queue = %plan.queue_name,
            exchange = %plan.exchange,
            prefetch = plan.prefetch,
            "queue tap connected"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = ConsumeContext {
            fanout: Arc::clone(&self.fanout),
            client: Arc::clone(&self.client),
            transform: self.config.transform.clone(),
            enabled: Arc::clone(&self.enabled),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(consume_loop(ctx));

        self.enabled.store(true, Ordering::SeqCst);
        *self.worker.lock().unwrap() = Some(Worker { shutdown_tx, handle });
        Ok(())
    }

    async fn disable(&self) -> Result<(), IngestError> {
        let worker = self.worker.lock().unwrap().take();
        let Some(worker) = worker else {
            return Ok(());
        };

        let _ = worker.shutdown_tx.send(true);
        if let Err(err) = worker.handle.await {
            error!(source = self.fanout.source_name(), error = %err, "consume task panicked");
        }
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct ConsumeContext<C: QueueClient> {
    fanout: Arc<Fanout>,
    client: Arc<tokio::sync::Mutex<C>>,
    transform: Option<Transform>,
    enabled: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
}

/// Sequential consume loop. A delivery picked up before shutdown is
/// processed to completion, including its transform; shutdown is only
/// observed between deliveries.
async fn consume_loop<C: QueueClient>(mut ctx: ConsumeContext<C>) {
    let mut client = ctx.client.lock().await;

    loop {
        if *ctx.shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = ctx.shutdown.changed() => break,
            next = client.next_delivery() => next,
        };

        match next {
            Ok(Some(message)) => {
                handle_delivery(&ctx.fanout, ctx.transform.as_ref(), message).await;
            }
            Ok(None) => {
                info!(source = ctx.fanout.source_name(), "queue subscription ended");
                break;
            }
            Err(err) => {
                error!(source = ctx.fanout.source_name(), error = %err, "queue consume failed");
                break;
            }
        }
    }

    if let Err(err) = client.close().await {
        warn!(source = ctx.fanout.source_name(), error = %err, "queue close failed");
    }
    ctx.enabled.store(false, Ordering::SeqCst);
}

/// Resolve, transform, emit and acknowledge one delivery.
async fn handle_delivery(fanout: &Fanout, transform: Option<&Transform>, message: InboundMessage) {
    let source_label = fanout.source_name().to_string();
    counter!("queue_deliveries_total", "source" => source_label.clone()).increment(1);

    let record = Record {
        author: message.author.unwrap_or_else(|| fanout.author_name().to_string()),
        source: message.source.unwrap_or_else(|| fanout.source_name().to_string()),
        timestamp: message.timestamp.unwrap_or_else(now_millis),
        content: message.body,
    };
    let acker = message.acker;

    let outcome = match transform {
        Some(transform) => match transform(record).await {
            Ok(Some(partial)) => fanout.emit(partial).await,
            Ok(None) => {
                debug!(source = %source_label, "transform suppressed delivery");
                Ok(())
            }
            Err(err) => {
                error!(source = %source_label, error = %err, "transform failed");
                Err(IngestError::transform(err.to_string()))
            }
        },
        None => fanout.emit_exact(record).await,
    };

    let ack_result = match outcome {
        Ok(()) => {
            counter!("queue_acks_total", "source" => source_label.clone()).increment(1);
            acker.ack().await
        }
        Err(_) => {
            counter!("queue_nacks_total", "source" => source_label.clone()).increment(1);
            acker.nack().await
        }
    };
    if let Err(err) = ack_result {
        error!(source = %source_label, error = %err, "acknowledgement failed");
    }
}
