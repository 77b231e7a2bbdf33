//! Builds taps and sinks from a blueprint and manages their lifecycles.
//!
//! Startup order: enable lifecycle-managed sinks, attach sinks to taps,
//! enable taps. Shutdown reverses it: disable taps first so no tap emits
//! into a closing sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config_loader::{FilePayloadMode, PipelineBlueprint};
use contracts::{AuthorDefault, Lifecycle, Sink, TapConfig};
use fanout::Tap;
use sinks::{FileSink, FileSinkConfig, LogSink, PayloadMode};
use stream_tap::{WebSocketTap, WebSocketTapConfig};
use tracing::{error, info};

enum TapInstance {
    WebSocket(Arc<WebSocketTap>),
    #[cfg(feature = "real-amqp")]
    Amqp(Arc<queue_tap::AmqpTap<queue_tap::LapinQueueClient>>),
}

impl TapInstance {
    fn as_tap(&self) -> &dyn Tap {
        match self {
            Self::WebSocket(tap) => tap.as_ref(),
            #[cfg(feature = "real-amqp")]
            Self::Amqp(tap) => tap.as_ref(),
        }
    }

    fn lifecycle(&self) -> &dyn Lifecycle {
        match self {
            Self::WebSocket(tap) => tap.as_ref(),
            #[cfg(feature = "real-amqp")]
            Self::Amqp(tap) => tap.as_ref(),
        }
    }

    fn name(&self) -> &str {
        self.as_tap().source_name()
    }
}

/// An assembled but not yet running pipeline.
pub struct Pipeline {
    /// Declared sinks in declaration order.
    sinks: Vec<(String, Arc<dyn Sink>)>,
    /// Taps and the sinks each one feeds.
    taps: Vec<(TapInstance, Vec<Arc<dyn Sink>>)>,
}

impl Pipeline {
    /// Instantiate every declared sink and tap.
    pub fn build(blueprint: &PipelineBlueprint) -> Result<Self> {
        let default_author = AuthorDefault::resolve(blueprint.default_author.clone());

        let mut sinks: Vec<(String, Arc<dyn Sink>)> = Vec::new();
        let mut by_name: HashMap<String, Arc<dyn Sink>> = HashMap::new();
        for spec in &blueprint.sinks.file {
            let mode = match spec.mode {
                FilePayloadMode::Text => PayloadMode::Text,
                FilePayloadMode::Binary => PayloadMode::Binary,
            };
            let sink: Arc<dyn Sink> = Arc::new(FileSink::new(
                FileSinkConfig::new(&spec.name, &spec.path).with_mode(mode),
            ));
            by_name.insert(spec.name.clone(), Arc::clone(&sink));
            sinks.push((spec.name.clone(), sink));
        }
        for spec in &blueprint.sinks.log {
            let sink: Arc<dyn Sink> = Arc::new(LogSink::new(&spec.name));
            by_name.insert(spec.name.clone(), Arc::clone(&sink));
            sinks.push((spec.name.clone(), sink));
        }

        let mut taps = Vec::new();
        for spec in &blueprint.taps.websocket {
            let mut tap_config = TapConfig::new(&spec.name);
            if let Some(ref author) = spec.author {
                tap_config = tap_config.with_author(author);
            }

            let mut config = WebSocketTapConfig::new(tap_config, spec.url.as_str());
            if let Some(ms) = spec.ping_keep_alive_ms {
                config = config.ping_keep_alive((ms > 0).then(|| Duration::from_millis(ms)));
            }
            config = config.silence_kill(
                spec.silence_kill_ms
                    .and_then(|ms| (ms > 0).then(|| Duration::from_millis(ms))),
            );

            let tap = WebSocketTap::new(config, &default_author)
                .with_context(|| format!("Failed to build websocket tap '{}'", spec.name))?;
            let attached = resolve_sinks(&by_name, &spec.name, &spec.sinks)?;
            taps.push((TapInstance::WebSocket(Arc::new(tap)), attached));
        }

        #[cfg(feature = "real-amqp")]
        for spec in &blueprint.taps.amqp {
            let mut tap_config = TapConfig::new(&spec.name);
            if let Some(ref author) = spec.author {
                tap_config = tap_config.with_author(author);
            }

            let mut config = queue_tap::AmqpTapConfig::new(
                tap_config,
                &spec.uri,
                &spec.exchange,
                &spec.queue_name,
            )
            .with_prefetch(spec.prefetch);
            for bind in &spec.binds {
                config = config.with_bind(match bind.exchange {
                    Some(ref exchange) => {
                        queue_tap::QueueBind::on_exchange(exchange, &bind.pattern)
                    }
                    None => queue_tap::QueueBind::new(&bind.pattern),
                });
            }
            if let Some(ms) = spec.queue_expires_ms {
                config = config.with_queue_expires(Duration::from_millis(ms));
            }

            let tap = queue_tap::AmqpTap::new(config, &default_author)
                .with_context(|| format!("Failed to build amqp tap '{}'", spec.name))?;
            let attached = resolve_sinks(&by_name, &spec.name, &spec.sinks)?;
            taps.push((TapInstance::Amqp(Arc::new(tap)), attached));
        }

        #[cfg(not(feature = "real-amqp"))]
        if !blueprint.taps.amqp.is_empty() {
            anyhow::bail!("This build has no AMQP support; rebuild with the 'real-amqp' feature");
        }

        Ok(Self { sinks, taps })
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    /// Enable sinks, attach them and enable taps.
    pub async fn start(&self) -> Result<()> {
        for (name, sink) in &self.sinks {
            if let Some(lifecycle) = sink.lifecycle() {
                lifecycle
                    .enable()
                    .await
                    .with_context(|| format!("Failed to enable sink '{name}'"))?;
                info!(sink = %name, "Sink enabled");
            }
        }

        for (tap, sinks) in &self.taps {
            for sink in sinks {
                tap.as_tap().attach_sink(Arc::clone(sink));
            }
        }

        for (tap, _) in &self.taps {
            tap.lifecycle()
                .enable()
                .await
                .with_context(|| format!("Failed to enable tap '{}'", tap.name()))?;
            info!(tap = %tap.name(), "Tap enabled");
        }

        Ok(())
    }

    /// Disable taps, then sinks. Errors are logged and do not stop the
    /// remaining teardown.
    pub async fn shutdown(&self) {
        for (tap, _) in &self.taps {
            if let Err(e) = tap.lifecycle().disable().await {
                error!(tap = %tap.name(), error = %e, "Failed to disable tap");
            } else {
                info!(tap = %tap.name(), "Tap disabled");
            }
        }

        for (name, sink) in &self.sinks {
            if let Some(lifecycle) = sink.lifecycle() {
                if let Err(e) = lifecycle.disable().await {
                    error!(sink = %name, error = %e, "Failed to disable sink");
                } else {
                    info!(sink = %name, "Sink disabled");
                }
            }
        }
    }
}

fn resolve_sinks(
    by_name: &HashMap<String, Arc<dyn Sink>>,
    tap_name: &str,
    names: &[String],
) -> Result<Vec<Arc<dyn Sink>>> {
    names
        .iter()
        .map(|name| {
            by_name.get(name).map(Arc::clone).with_context(|| {
                format!("Tap '{tap_name}' references undeclared sink '{name}'")
            })
        })
        .collect()
}
