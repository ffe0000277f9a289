// src/core/realtime/websocket.rs

//! A WebSocket `Transport` built on `tokio-tungstenite`.

use super::events::ChannelEvent;
use super::transport::{ConnectionSink, ReconnectPolicy, Transport, TransportConnection, connection_pair};
use crate::core::VigilError;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `<base_url>/<channel_key>?token=<token>` for every channel.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    base_url: String,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    /// `base_url` must be a `ws://` or `wss://` URL.
    pub fn new(base_url: &str, policy: ReconnectPolicy) -> Result<Self, VigilError> {
        let parsed = Url::parse(base_url)?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(VigilError::InvalidConfig(format!(
                "realtime URL must use ws:// or wss://, got '{base_url}'"
            )));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Builds the handshake URL. Channel keys may carry their own query
    /// (e.g. `detections?camera_id=7`); the token is appended to it.
    pub fn channel_url(&self, channel_key: &str, token: &str) -> Result<Url, VigilError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, channel_key))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, channel_key: &str, token: &str) -> TransportConnection {
        let (sink, connection) = connection_pair();
        match self.channel_url(channel_key, token) {
            Ok(url) => {
                let worker = SocketWorker {
                    channel_key: channel_key.to_string(),
                    url,
                    policy: self.policy,
                    connect_timeout: self.connect_timeout,
                    sink,
                };
                tokio::spawn(worker.run());
            }
            Err(e) => {
                // Dropping the sink right after closes the event stream.
                sink.emit(ChannelEvent::Error(e.to_string()));
            }
        }
        connection
    }
}

/// Why a connected session ended.
enum SessionEnd {
    Dropped,
    ShutdownRequested,
}

struct SocketWorker {
    channel_key: String,
    url: Url,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    sink: ConnectionSink,
}

impl SocketWorker {
    async fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            let connected = tokio::select! {
                biased;
                _ = self.sink.closed() => return,
                result = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())) => result,
            };

            match connected {
                Ok(Ok((socket, _))) => {
                    attempt = 0;
                    info!("Connected to '{}' channel.", self.channel_key);
                    if !self.sink.emit(ChannelEvent::Connected) {
                        return;
                    }
                    if let SessionEnd::ShutdownRequested = self.pump(socket).await {
                        return;
                    }
                    info!("Disconnected from '{}' channel.", self.channel_key);
                }
                Ok(Err(e)) => {
                    warn!("Connection error on '{}' channel: {}", self.channel_key, e);
                    self.sink.emit(ChannelEvent::Error(e.to_string()));
                }
                Err(_) => {
                    warn!("Timed out connecting to '{}' channel.", self.channel_key);
                    self.sink
                        .emit(ChannelEvent::Error("connection timed out".to_string()));
                }
            }

            if self.sink.is_closed() {
                return;
            }

            attempt += 1;
            let Some(delay) = self.policy.delay_for_attempt(attempt) else {
                debug!(
                    "Giving up on '{}' channel after {} reconnection attempts.",
                    self.channel_key,
                    attempt - 1
                );
                return;
            };

            tokio::select! {
                biased;
                _ = self.sink.closed() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            debug!(
                "Reconnecting to '{}' channel (attempt {}/{}).",
                self.channel_key, attempt, self.policy.max_attempts
            );
        }
    }

    /// Forwards frames until the socket drops or the registry closes the
    /// channel. Ping replies are queued by tungstenite itself while reading.
    async fn pump(&self, socket: Socket) -> SessionEnd {
        let (mut write, mut read) = socket.split();

        loop {
            tokio::select! {
                biased;
                _ = self.sink.closed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::ShutdownRequested;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let payload = serde_json::from_str::<Value>(text.as_str())
                            .unwrap_or_else(|_| Value::String(text.as_str().to_string()));
                        if !self.sink.emit(ChannelEvent::Message(payload)) {
                            return SessionEnd::ShutdownRequested;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match serde_json::from_slice::<Value>(&bytes) {
                        Ok(payload) => {
                            if !self.sink.emit(ChannelEvent::Message(payload)) {
                                return SessionEnd::ShutdownRequested;
                            }
                        }
                        Err(e) => debug!("Dropping non-JSON binary frame on '{}': {}", self.channel_key, e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        self.sink.emit(ChannelEvent::Disconnected);
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.sink.emit(ChannelEvent::Error(e.to_string()));
                        self.sink.emit(ChannelEvent::Disconnected);
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }
}
