// src/core/realtime/mod.rs

//! The realtime channel registry.
//! It multiplexes any number of local listeners over one transport
//! connection per channel key.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod channels;
pub mod events;
pub mod transport;
pub mod websocket;

pub use events::{ChannelEvent, ConnectionState};
pub use transport::{ConnectionSink, ReconnectPolicy, Transport, TransportConnection};
pub use websocket::WebSocketTransport;

/// A channel listener. Identity (the `Arc` allocation) is what de-duplicates
/// listeners, so subscribing the same `Arc` twice registers it once.
pub type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

struct ListenerEntry {
    id: u64,
    listener: Listener,
}

/// One channel key: its connection handle, state and listener set.
struct Channel {
    key: String,
    listeners: RwLock<Vec<ListenerEntry>>,
    state: RwLock<ConnectionState>,
    shutdown: CancellationToken,
}

impl Channel {
    /// Adds `listener` unless the same allocation is already registered.
    /// Returns the listener's id either way.
    fn add_listener(&self, listener: Listener, next_id: &AtomicU64) -> u64 {
        let mut listeners = self.listeners.write();
        if let Some(existing) = listeners
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.listener, &listener))
        {
            return existing.id;
        }
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        listeners.push(ListenerEntry { id, listener });
        id
    }

    fn remove_listener(&self, id: u64) {
        self.listeners.write().retain(|entry| entry.id != id);
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Delivers `event` to a snapshot of the listener set, so listeners may
    /// subscribe or unsubscribe from inside their callback.
    fn dispatch(&self, event: &ChannelEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|entry| entry.listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    fn observe(&self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Connected => self.set_state(ConnectionState::Connected),
            ChannelEvent::Disconnected | ChannelEvent::Error(_) => {
                self.set_state(ConnectionState::Disconnected)
            }
            ChannelEvent::Message(_) => {}
        }
    }

    async fn run(self: Arc<Self>, mut connection: TransportConnection) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = connection.recv() => match event {
                    Some(event) => {
                        self.observe(&event);
                        self.dispatch(&event);
                    }
                    None => {
                        debug!("Transport for '{}' channel finished.", self.key);
                        break;
                    }
                }
            }
        }
        self.set_state(ConnectionState::Closed);
    }
}

/// The handle returned by `subscribe`. Dropping it keeps the listener
/// registered; call `unsubscribe` to remove it.
pub struct Subscription {
    key: String,
    id: u64,
    channel: Weak<Channel>,
    active: AtomicBool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    /// Removes this listener from its channel. Calling it again does nothing.
    /// The channel's connection stays open either way.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(channel) = self.channel.upgrade() {
            channel.remove_listener(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn channel_key(&self) -> &str {
        &self.key
    }
}

/// Owns every open channel. Construct one per console and share it.
///
/// Connections are opened lazily by the first `subscribe` (or `connect`) for
/// a key and live until `unsubscribe_all`/`disconnect_all`, regardless of
/// how many listeners remain. Connections run on the tokio runtime the
/// registry was built in, so `subscribe` may be called from any thread.
pub struct ChannelRegistry {
    transport: Arc<dyn Transport>,
    channels: DashMap<String, Arc<Channel>>,
    next_listener_id: AtomicU64,
    runtime: Option<Handle>,
}

impl ChannelRegistry {
    /// Captures the current tokio runtime, if any. A registry built outside
    /// a runtime falls back to whichever runtime `subscribe` is called from.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::build(transport, Handle::try_current().ok())
    }

    /// Runs every channel connection on `runtime`.
    pub fn with_runtime(transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        Self::build(transport, Some(runtime))
    }

    fn build(transport: Arc<dyn Transport>, runtime: Option<Handle>) -> Self {
        Self {
            transport,
            channels: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
            runtime,
        }
    }

    /// Registers `listener` on `channel_key`, opening the channel with
    /// `token` if it is not open yet. Never blocks and never fails; connection
    /// problems arrive as `ChannelEvent::Error`.
    pub fn subscribe(&self, channel_key: &str, token: &str, listener: Listener) -> Subscription {
        // The listener is added while the map entry is held, so a concurrent
        // `unsubscribe_all` either runs first or clears this listener too.
        let (channel, id) = {
            let entry = self
                .channels
                .entry(channel_key.to_string())
                .or_insert_with(|| self.open_channel(channel_key, token));
            let id = entry.value().add_listener(listener, &self.next_listener_id);
            (entry.value().clone(), id)
        };
        debug!("Listener {} subscribed to '{}' channel.", id, channel_key);
        Subscription {
            key: channel_key.to_string(),
            id,
            channel: Arc::downgrade(&channel),
            active: AtomicBool::new(true),
        }
    }

    /// Closure flavour of `subscribe`. Each call registers a new listener.
    pub fn subscribe_fn<F>(&self, channel_key: &str, token: &str, listener: F) -> Subscription
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.subscribe(channel_key, token, Arc::new(listener))
    }

    pub fn subscribe_alerts(&self, token: &str, listener: Listener) -> Subscription {
        self.subscribe(&channels::alerts(), token, listener)
    }

    pub fn subscribe_detections(
        &self,
        token: &str,
        camera_id: Option<&str>,
        listener: Listener,
    ) -> Subscription {
        self.subscribe(&channels::detections(camera_id), token, listener)
    }

    pub fn subscribe_camera_stream(
        &self,
        camera_id: &str,
        token: &str,
        listener: Listener,
    ) -> Subscription {
        self.subscribe(&channels::camera_stream(camera_id), token, listener)
    }

    pub fn subscribe_system(&self, token: &str, listener: Listener) -> Subscription {
        self.subscribe(&channels::system(), token, listener)
    }

    /// Opens `channel_key` without registering a listener.
    pub fn connect(&self, channel_key: &str, token: &str) {
        self.ensure_channel(channel_key, token);
    }

    /// Closes the channel's connection and forgets its listeners.
    /// Returns false if the key had no channel.
    pub fn unsubscribe_all(&self, channel_key: &str) -> bool {
        let Some((_, channel)) = self.channels.remove(channel_key) else {
            return false;
        };
        channel.shutdown.cancel();
        channel.listeners.write().clear();
        channel.set_state(ConnectionState::Closed);
        info!("Closed '{}' channel.", channel_key);
        true
    }

    /// Tears down every channel.
    pub fn disconnect_all(&self) {
        for key in self.channel_keys() {
            self.unsubscribe_all(&key);
        }
    }

    pub fn connection_state(&self, channel_key: &str) -> Option<ConnectionState> {
        self.channels
            .get(channel_key)
            .map(|channel| *channel.state.read())
    }

    pub fn listener_count(&self, channel_key: &str) -> usize {
        self.channels
            .get(channel_key)
            .map_or(0, |channel| channel.listeners.read().len())
    }

    pub fn connection_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the keys of all open channels, sorted.
    pub fn channel_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn ensure_channel(&self, channel_key: &str, token: &str) -> Arc<Channel> {
        if let Some(existing) = self.channels.get(channel_key) {
            return existing.value().clone();
        }

        // The entry API holds the shard lock, so racing callers for the same
        // key observe exactly one `open`.
        self.channels
            .entry(channel_key.to_string())
            .or_insert_with(|| self.open_channel(channel_key, token))
            .value()
            .clone()
    }

    fn open_channel(&self, channel_key: &str, token: &str) -> Arc<Channel> {
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            warn!(
                "No tokio runtime available; '{}' channel starts closed.",
                channel_key
            );
            return Arc::new(Channel {
                key: channel_key.to_string(),
                listeners: RwLock::new(Vec::new()),
                state: RwLock::new(ConnectionState::Closed),
                shutdown: CancellationToken::new(),
            });
        };

        info!("Opening '{}' channel.", channel_key);
        // Transports spawn their workers from `open`.
        let connection = {
            let _guard = runtime.enter();
            self.transport.open(channel_key, token)
        };
        let channel = Arc::new(Channel {
            key: channel_key.to_string(),
            listeners: RwLock::new(Vec::new()),
            state: RwLock::new(ConnectionState::Connecting),
            shutdown: connection.shutdown_handle(),
        });
        runtime.spawn(channel.clone().run(connection));
        channel
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        for entry in self.channels.iter() {
            entry.value().shutdown.cancel();
        }
    }
}
