// src/core/realtime/transport.rs

//! The seam between the channel registry and whatever carries the bytes.
//!
//! A `Transport` opens one connection per channel key and reports its
//! lifecycle and payloads as `ChannelEvent`s. Reconnection is the
//! transport's business: it is configured once through `ReconnectPolicy`
//! when the transport is built, and the registry only observes the outcome.

use super::events::ChannelEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Bounded, fixed-delay reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Reconnection attempts allowed after a drop or a failed first connect.
    /// The count starts over after every successful connection.
    pub max_attempts: u32,
    /// Pause before each reconnection attempt.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Returns the delay before reconnection attempt number `attempt`
    /// (1-based), or `None` once the budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if self.enabled && attempt >= 1 && attempt <= self.max_attempts {
            Some(self.delay)
        } else {
            None
        }
    }
}

/// Opens channel connections.
///
/// `open` must not block: it hands back a `TransportConnection` right away
/// and does the actual connecting in the background. Failures are reported
/// as `ChannelEvent::Error` on the returned connection.
pub trait Transport: Send + Sync {
    fn open(&self, channel_key: &str, token: &str) -> TransportConnection;
}

/// Creates the two ends of a connection: the sink a transport writes events
/// into and the `TransportConnection` the registry reads them from.
pub fn connection_pair() -> (ConnectionSink, TransportConnection) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    (
        ConnectionSink {
            events: tx,
            shutdown: shutdown.clone(),
        },
        TransportConnection {
            events: rx,
            shutdown,
        },
    )
}

/// The registry's end of one channel connection.
///
/// The event stream ends (`recv` returns `None`) once the transport drops its
/// sink, i.e. after it gave up reconnecting or observed `close`.
#[derive(Debug)]
pub struct TransportConnection {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    shutdown: CancellationToken,
}

impl TransportConnection {
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// A handle that closes this connection when cancelled.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Asks the transport to close the connection and stop reconnecting.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

/// The transport's end of one channel connection.
#[derive(Debug, Clone)]
pub struct ConnectionSink {
    events: mpsc::UnboundedSender<ChannelEvent>,
    shutdown: CancellationToken,
}

impl ConnectionSink {
    /// Forwards an event. Returns false when nobody is listening any more,
    /// which the transport should treat like a close request.
    pub fn emit(&self, event: ChannelEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// True once the registry closed the connection or dropped its end.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.events.is_closed()
    }

    /// Resolves when the registry closes the connection.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }
}
