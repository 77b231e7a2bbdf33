//! Streams a WebSocket feed through a pipe into a file and a log sink.
//!
//! The URL resolver fails 80% of the time to show the backoff behavior:
//! watch the logs while the tap retries, then start a local WebSocket
//! server on port 8080 to see records flow.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use contracts::{AuthorDefault, Lifecycle, TapConfig};
use fanout::{Pipe, Tap};
use sinks::{FileSink, FileSinkConfig, LogSink, PayloadMode};
use stream_tap::{UrlSource, WebSocketTap, WebSocketTapConfig};
use tracing::info;

async fn flaky_url() -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync>> {
    if rand::random::<f64>() < 0.8 {
        return Err("resolver failed".into());
    }
    Ok("ws://localhost:8080/weather-updates".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_with_config(observability::ObservabilityConfig {
        log_format: observability::LogFormat::Pretty,
        metrics_port: None,
        default_log_level: "debug".to_string(),
    })?;

    let pipe = Arc::new(Pipe::new());

    let config = WebSocketTapConfig::new(
        TapConfig::new("weather"),
        UrlSource::resolver(|| flaky_url()),
    )
    .ping_keep_alive(Some(Duration::from_secs(10)))
    .silence_kill(Some(Duration::from_secs(15)));

    let ws_tap = WebSocketTap::new(config, &AuthorDefault::resolve(None))?;
    ws_tap.attach_sink(pipe.clone());
    ws_tap.enable().await?;

    let file_sink = Arc::new(FileSink::new(
        FileSinkConfig::new("weather-file", "./data/data-$t.txt").with_mode(PayloadMode::Text),
    ));
    file_sink.enable().await?;
    pipe.attach_sink(file_sink.clone());
    pipe.attach_sink(Arc::new(LogSink::default()));

    info!("Streaming; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    ws_tap.disable().await?;
    file_sink.disable().await?;
    Ok(())
}
