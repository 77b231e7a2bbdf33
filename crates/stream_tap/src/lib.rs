//! # Stream Tap
//!
//! Resilient streaming source over WebSocket.
//!
//! Responsibilities:
//! - URL resolution with capped exponential backoff (never gives up)
//! - Connection lifecycle with automatic reconnect after any disconnect
//! - Liveness probing via ping/pong with random nonces
//! - Silence-based forced reconnect
//! - Broadcasting inbound payloads to attached sinks
//!
//! The whole connection session (socket, timers, probe state) is owned by a
//! single supervisor task and torn down as a unit, so no timer or close event
//! can outlive the session it belongs to.

mod config;
mod session;
mod state;
mod tap;

pub use config::{UrlResolver, UrlSource, WebSocketTapConfig, DEFAULT_PING_KEEP_ALIVE};
pub use state::ConnectionState;
pub use tap::WebSocketTap;
