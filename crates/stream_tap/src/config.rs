//! WebSocket tap configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use contracts::{IngestError, TapConfig};

/// Default liveness-probe interval
pub const DEFAULT_PING_KEEP_ALIVE: Duration = Duration::from_secs(10);

/// Boxed async URL resolver
///
/// Invoked repeatedly until it returns a URL; failures only back off, they
/// never abort the connection attempt.
pub type UrlResolver = Arc<
    dyn Fn() -> BoxFuture<'static, Result<String, Box<dyn std::error::Error + Send + Sync>>>
        + Send
        + Sync,
>;

/// Where the tap gets its WebSocket URL from
#[derive(Clone)]
pub enum UrlSource {
    /// Fixed URL, resolution is immediate
    Literal(String),

    /// Async resolver function, retried with exponential backoff
    Resolver(UrlResolver),
}

impl UrlSource {
    /// Wrap an async closure as a retrying resolver.
    pub fn resolver<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, Box<dyn std::error::Error + Send + Sync>>>
            + Send
            + 'static,
    {
        Self::Resolver(Arc::new(move || f().boxed()))
    }
}

impl From<&str> for UrlSource {
    fn from(url: &str) -> Self {
        Self::Literal(url.to_string())
    }
}

impl From<String> for UrlSource {
    fn from(url: String) -> Self {
        Self::Literal(url)
    }
}

impl fmt::Debug for UrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(url) => f.debug_tuple("Literal").field(url).finish(),
            Self::Resolver(_) => f.debug_tuple("Resolver").field(&"<fn>").finish(),
        }
    }
}

/// WebSocket tap configuration
#[derive(Debug, Clone)]
pub struct WebSocketTapConfig {
    /// Tap identity (source name, author override)
    pub tap: TapConfig,

    /// WebSocket URL or resolver
    pub url: UrlSource,

    /// Liveness-probe interval; `None` disables probing.
    ///
    /// A dead connection is detected between one and two intervals after the
    /// last successful probe, because the check for a missing pong happens
    /// right before the next ping is sent.
    pub ping_keep_alive: Option<Duration>,

    /// Reconnect after this long without any inbound data message;
    /// `None` disables silence detection.
    pub silence_kill: Option<Duration>,
}

impl WebSocketTapConfig {
    /// Create a configuration with default probing (10s) and no silence
    /// detection.
    pub fn new(tap: TapConfig, url: impl Into<UrlSource>) -> Self {
        Self {
            tap,
            url: url.into(),
            ping_keep_alive: Some(DEFAULT_PING_KEEP_ALIVE),
            silence_kill: None,
        }
    }

    /// Set or disable the liveness-probe interval.
    pub fn ping_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.ping_keep_alive = interval;
        self
    }

    /// Set or disable the silence threshold.
    pub fn silence_kill(mut self, threshold: Option<Duration>) -> Self {
        self.silence_kill = threshold;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigValidation` for an empty tap name or a zero-duration
    /// probe interval or silence threshold.
    pub fn validate(&self) -> Result<(), IngestError> {
        self.tap.validate()?;

        if self.ping_keep_alive.is_some_and(|d| d.is_zero()) {
            return Err(IngestError::config_validation(
                "ping_keep_alive",
                "must be disabled or greater than zero",
            ));
        }

        if self.silence_kill.is_some_and(|d| d.is_zero()) {
            return Err(IngestError::config_validation(
                "silence_kill",
                "must be disabled or greater than zero",
            ));
        }

        Ok(())
    }
}
