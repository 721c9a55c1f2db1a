//! Basic type definitions for the chat client
//!
//! Provides newtype wrappers for type safety and the connection status:
//! - `ChannelId`: integer channel identifier
//! - `SessionId`: UUID-based identifier for one channel session (log correlation)
//! - `ConnectionStatus` / `ConnectionSnapshot`: what consumers observe

use uuid::Uuid;

use crate::error::ConnectionError;

/// Chat channel identifier (newtype pattern)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4. Every channel activation gets a fresh one so log lines
/// from a torn-down session can be told apart from its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of one channel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Before the first attempt
    Idle,
    /// Transport handshake in flight
    Connecting,
    /// Handshake complete, frames flowing
    Open,
    /// Waiting on the reconnect timer
    Reconnecting,
    /// Terminal, no further reconnection
    Closed,
}

impl ConnectionStatus {
    /// Whether the consumer should show a "disconnected" indicator
    pub fn is_disconnected(self) -> bool {
        !matches!(self, ConnectionStatus::Open)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a connection, published after every transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub channel_id: ChannelId,
    pub status: ConnectionStatus,
    pub reconnect_attempt: u32,
    pub error: Option<ConnectionError>,
}

impl ConnectionSnapshot {
    /// Snapshot of a connection that has not attempted anything yet
    pub fn idle(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            status: ConnectionStatus::Idle,
            reconnect_attempt: 0,
            error: None,
        }
    }
}
