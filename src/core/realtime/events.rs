// src/core/realtime/events.rs

use serde_json::Value;

/// Everything a channel listener can be told.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The underlying connection (re)opened.
    Connected,
    /// The underlying connection closed. The transport may still reconnect.
    Disconnected,
    /// The transport failed to connect or lost the connection abnormally.
    Error(String),
    /// An inbound payload from the server.
    Message(Value),
}

impl ChannelEvent {
    pub fn is_message(&self) -> bool {
        matches!(self, ChannelEvent::Message(_))
    }
}

/// The observable lifecycle of one channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opened by the registry, handshake not completed yet.
    Connecting,
    Connected,
    /// Dropped; the transport may be between reconnection attempts.
    Disconnected,
    /// The transport gave up or was shut down. No further events will arrive.
    Closed,
}
