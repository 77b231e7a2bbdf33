//! Connection supervisor - resolve, connect, probe, reconnect
//!
//! One supervisor task per tap. Each connection session is a single scope
//! owning the socket, both timers and the outstanding-probe state; leaving
//! the scope destroys all of it, so a superseded session can never receive a
//! stale timer tick or close event.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use contracts::PartialRecord;
use fanout::Fanout;

use crate::config::{UrlSource, WebSocketTapConfig};
use crate::state::{ConnectionState, StateCell};

/// First retry delay for a failing URL resolver
const INITIAL_RESOLVE_BACKOFF: Duration = Duration::from_millis(50);

/// Resolver backoff cap
const MAX_RESOLVE_BACKOFF: Duration = Duration::from_millis(10_000);

/// Delay before reconnecting after an unexpected close
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Everything the supervisor task needs, cloned out of the tap at enable time
pub(crate) struct SessionContext {
    pub config: WebSocketTapConfig,
    pub fanout: Arc<Fanout>,
    pub state: StateCell,
    pub shutdown: watch::Receiver<bool>,
}

/// How a live session ended
enum SessionEnd {
    /// `disable()` was called; no reconnect may be scheduled
    Shutdown,
    /// Tear down and reconnect after `delay`
    Reconnect {
        delay: Duration,
        reason: &'static str,
    },
}

/// Supervisor loop: resolve -> connect -> session -> (reconnect | stop).
pub(crate) async fn supervise(mut ctx: SessionContext) {
    let source = ctx.config.tap.name.clone();
    let mut reconnect_delay = Duration::ZERO;

    loop {
        if *ctx.shutdown.borrow() {
            break;
        }

        if !reconnect_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = ctx.shutdown.changed() => break,
            }
        }
        // Every pass after the first is a reconnect attempt.
        reconnect_delay = RECONNECT_DELAY;

        ctx.state.set(ConnectionState::ResolvingUrl);
        let url = tokio::select! {
            url = resolve_url(&ctx.config.url, &source) => url,
            _ = ctx.shutdown.changed() => break,
        };

        ctx.state.set(ConnectionState::Connecting);
        let stream = tokio::select! {
            result = tokio_tungstenite::connect_async(url.as_str()) => match result {
                Ok((stream, _response)) => stream,
                Err(e) => {
                    warn!(source = %source, url = %url, error = %e, "websocket connect failed");
                    counter!("tap_reconnects_total", "source" => source.clone(), "reason" => "connect-failed")
                        .increment(1);
                    ctx.state.set(ConnectionState::Disconnected);
                    continue;
                }
            },
            _ = ctx.shutdown.changed() => break,
        };

        info!(source = %source, url = %url, "websocket connected");
        ctx.state.set(ConnectionState::Connected);

        let end = run_session(&mut ctx, stream).await;

        // Session scope is gone: socket closed, timers and probe state dropped.
        ctx.state.set(ConnectionState::Disconnecting);
        ctx.state.set(ConnectionState::Disconnected);

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Reconnect { delay, reason } => {
                info!(source = %source, reason, delay_ms = delay.as_millis() as u64, "websocket reconnecting");
                counter!("tap_reconnects_total", "source" => source.clone(), "reason" => reason)
                    .increment(1);
                reconnect_delay = delay;
            }
        }
    }

    ctx.state.set(ConnectionState::Disconnected);
    debug!(source = %source, "websocket supervisor stopped");
}

/// Resolve the connection URL.
///
/// A literal URL resolves immediately. A resolver function is retried
/// indefinitely; the inter-attempt delay starts at 50ms and doubles per
/// failure up to 10s. Resolution never gives up, it only backs off.
pub(crate) async fn resolve_url(url: &UrlSource, source: &str) -> String {
    match url {
        UrlSource::Literal(url) => url.clone(),
        UrlSource::Resolver(resolver) => {
            let mut delay = INITIAL_RESOLVE_BACKOFF;

            loop {
                debug!(source = %source, "resolving websocket url");
                match resolver().await {
                    Ok(url) => {
                        info!(source = %source, url = %url, "resolved websocket url");
                        return url;
                    }
                    Err(e) => {
                        debug!(
                            source = %source,
                            error = %e,
                            retry_ms = delay.as_millis() as u64,
                            "websocket url resolution failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(MAX_RESOLVE_BACKOFF);
                    }
                }
            }
        }
    }
}

/// Run one live session until shutdown or a reconnect trigger.
async fn run_session(
    ctx: &mut SessionContext,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> SessionEnd {
    let source = ctx.config.tap.name.clone();
    let (mut write, mut read) = stream.split();

    // Per-session ephemeral state; a fresh session always starts with no
    // outstanding probe.
    let mut last_message = Instant::now();
    let mut outstanding_ping: Option<Bytes> = None;

    // First probe fires on entering Connected, then every interval.
    let mut ping_timer = ctx.config.ping_keep_alive.map(|period| {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });

    // Silence checks start one full threshold after connecting.
    let silence_threshold = ctx.config.silence_kill;
    let mut silence_timer = silence_threshold.map(|period| {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    last_message = Instant::now();
                    let content = Bytes::from(text.as_bytes().to_vec());
                    // Sink failures are logged inside the fanout.
                    let _ = ctx.fanout.emit(PartialRecord::new(content)).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    last_message = Instant::now();
                    let content: Bytes = data.into();
                    let _ = ctx.fanout.emit(PartialRecord::new(content)).await;
                }
                Some(Ok(Message::Pong(data))) => {
                    match outstanding_ping {
                        Some(ref nonce) if data[..] == nonce[..] => {
                            outstanding_ping = None;
                        }
                        Some(_) => {
                            // The true response may still arrive; keep waiting.
                            warn!(source = %source, "websocket pong payload mismatch, ignoring");
                        }
                        None => {
                            // Unsolicited pong.
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    info!(source = %source, "websocket closed by peer");
                    return SessionEnd::Reconnect { delay: RECONNECT_DELAY, reason: "close" };
                }
                Some(Ok(_)) => {
                    warn!(source = %source, "websocket received a frame it could not handle, dropping");
                }
                Some(Err(e)) => {
                    // Transport errors alone never tear the session down;
                    // closure and the liveness/silence paths do.
                    warn!(source = %source, error = %e, "websocket transport error");
                }
                None => {
                    info!(source = %source, "websocket stream ended");
                    return SessionEnd::Reconnect { delay: RECONNECT_DELAY, reason: "close" };
                }
            },

            _ = tick(ping_timer.as_mut()) => {
                if outstanding_ping.is_some() {
                    warn!(source = %source, "websocket missed pong, forcing reconnect");
                    return SessionEnd::Reconnect { delay: Duration::ZERO, reason: "missed-pong" };
                }

                let nonce = Bytes::copy_from_slice(&rand::random::<[u8; 8]>());
                if let Err(e) = write.send(Message::Ping(nonce.clone())).await {
                    warn!(source = %source, error = %e, "websocket ping send failed, forcing reconnect");
                    return SessionEnd::Reconnect { delay: Duration::ZERO, reason: "ping-send-failed" };
                }
                outstanding_ping = Some(nonce);
            },

            _ = tick(silence_timer.as_mut()) => {
                let threshold = silence_threshold.expect("silence timer implies threshold");
                if last_message.elapsed() > threshold {
                    warn!(
                        source = %source,
                        threshold_ms = threshold.as_millis() as u64,
                        "websocket silent for too long, forcing reconnect"
                    );
                    return SessionEnd::Reconnect { delay: Duration::ZERO, reason: "silence" };
                }
            },

            _ = ctx.shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
        }
    }
}

/// Await the next tick of an optional timer; a disabled timer never fires.
async fn tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_resolver_backoff_schedule() {
        // Fails 3 times, then succeeds: 4 attempts, delays 50 + 100 + 200ms.
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let url = UrlSource::resolver(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err("not yet".into())
                } else {
                    Ok("ws://resolved:1234".to_string())
                }
            }
        });

        let start = Instant::now();
        let resolved = resolve_url(&url, "test").await;

        assert_eq!(resolved, "ws://resolved:1234");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);

        let elapsed = start.elapsed();
        assert_eq!(elapsed, Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_backoff_caps_at_ten_seconds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        // 10 failures: 50*2^9 = 25600 would exceed the cap; with the cap the
        // total is 50+100+200+400+800+1600+3200+6400+10000+10000 = 32750ms.
        let url = UrlSource::resolver(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 10 {
                    Err("flaky".into())
                } else {
                    Ok("ws://resolved:1".to_string())
                }
            }
        });

        let start = Instant::now();
        resolve_url(&url, "test").await;

        assert_eq!(attempts.load(Ordering::SeqCst), 11);
        assert_eq!(start.elapsed(), Duration::from_millis(32_750));
    }

    #[tokio::test]
    async fn test_literal_url_resolves_immediately() {
        let url = UrlSource::from("ws://fixed:9001");
        assert_eq!(resolve_url(&url, "test").await, "ws://fixed:9001");
    }
}
