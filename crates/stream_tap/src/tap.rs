//! WebSocketTap - the public tap type

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use contracts::{AuthorDefault, IngestError, Lifecycle, Sink};
use fanout::{Fanout, Tap};

use crate::config::WebSocketTapConfig;
use crate::session::{supervise, SessionContext};
use crate::state::{ConnectionState, StateCell};

/// Running supervisor task plus its shutdown signal
struct Worker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Tap that sources data from a WebSocket server and keeps itself connected
/// through network failure.
///
/// `enable()` spawns a supervisor task that owns the connection exclusively;
/// `disable()` stops it and guarantees no further reconnect is scheduled.
pub struct WebSocketTap {
    config: WebSocketTapConfig,
    fanout: Arc<Fanout>,
    state: StateCell,
    worker: Mutex<Option<Worker>>,
}

impl WebSocketTap {
    /// Create a WebSocket tap.
    ///
    /// The effective author is resolved once here and cached.
    ///
    /// # Errors
    /// Returns `ConfigValidation` for an empty name or zero-duration
    /// probe/silence settings.
    pub fn new(
        config: WebSocketTapConfig,
        default_author: &AuthorDefault,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        let fanout = Arc::new(Fanout::new(&config.tap, default_author)?);

        Ok(Self {
            config,
            fanout,
            state: StateCell::new(),
            worker: Mutex::new(None),
        })
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

impl Tap for WebSocketTap {
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
impl Lifecycle for WebSocketTap {
    fn is_enabled(&self) -> bool {
        self.state.get().is_active()
    }

    async fn enable(&self) -> Result<(), IngestError> {
        let mut worker = self.worker.lock().unwrap();

        if let Some(existing) = worker.as_ref() {
            if !existing.handle.is_finished() {
                debug!(source = %self.source_name(), "websocket tap already enabled");
                return Ok(());
            }
        }

        // The tap must report itself enabled as soon as this call returns,
        // before the supervisor task has had a chance to run.
        self.state.set(ConnectionState::ResolvingUrl);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = SessionContext {
            config: self.config.clone(),
            fanout: Arc::clone(&self.fanout),
            state: self.state.clone(),
            shutdown: shutdown_rx,
        };

        let handle = tokio::spawn(supervise(ctx));
        *worker = Some(Worker {
            shutdown_tx,
            handle,
        });

        Ok(())
    }

    async fn disable(&self) -> Result<(), IngestError> {
        let worker = self.worker.lock().unwrap().take();

        if let Some(worker) = worker {
            let _ = worker.shutdown_tx.send(true);
            if let Err(e) = worker.handle.await {
                error!(source = %self.source_name(), error = ?e, "websocket supervisor panicked");
            }
        }

        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TapConfig;

    fn test_tap() -> WebSocketTap {
        let config = WebSocketTapConfig::new(
            TapConfig::new("stream").with_author("tester"),
            "ws://127.0.0.1:1",
        );
        WebSocketTap::new(config, &"default".into()).unwrap()
    }

    #[test]
    fn test_identity_resolved_at_construction() {
        let tap = test_tap();
        assert_eq!(tap.source_name(), "stream");
        assert_eq!(tap.author_name(), "tester");
        assert_eq!(tap.state(), ConnectionState::Disconnected);
        assert!(!tap.is_enabled());
    }

    #[tokio::test]
    async fn test_disable_without_enable_is_noop() {
        let tap = test_tap();
        tap.disable().await.unwrap();
        tap.disable().await.unwrap();
        assert_eq!(tap.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_enabled_immediately_after_enable() {
        let tap = test_tap();
        tap.enable().await.unwrap();
        // No yield to the supervisor task yet; the state change must already
        // be visible.
        assert!(tap.is_enabled());
        assert_eq!(tap.state(), ConnectionState::ResolvingUrl);
        tap.disable().await.unwrap();
    }

    #[tokio::test]
    async fn test_enable_is_idempotent() {
        let tap = test_tap();
        tap.enable().await.unwrap();
        tap.enable().await.unwrap();
        assert!(tap.is_enabled());
        tap.disable().await.unwrap();
        assert!(!tap.is_enabled());
    }
}
