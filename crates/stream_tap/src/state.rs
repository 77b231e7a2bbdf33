//! Connection state machine

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection, nothing in progress
    Disconnected = 0,
    /// Waiting for the URL resolver (may back off arbitrarily long)
    ResolvingUrl = 1,
    /// WebSocket handshake in progress
    Connecting = 2,
    /// Live session
    Connected = 3,
    /// Teardown in progress
    Disconnecting = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ResolvingUrl,
            2 => Self::Connecting,
            3 => Self::Connected,
            4 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }

    /// Whether the tap is considered enabled in this state
    pub fn is_active(self) -> bool {
        matches!(self, Self::ResolvingUrl | Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::ResolvingUrl => "resolving-url",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Shared state cell, written by the supervisor task and read by callers
#[derive(Debug, Clone, Default)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cell_roundtrip() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ConnectionState::Disconnected);

        for state in [
            ConnectionState::ResolvingUrl,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
            ConnectionState::Disconnected,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn test_active_states() {
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(ConnectionState::ResolvingUrl.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(!ConnectionState::Disconnecting.is_active());
    }
}
