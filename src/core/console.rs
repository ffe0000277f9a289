// src/core/console.rs

//! Wires configuration into a session manager and a channel registry.

use crate::config::{Config, StorageBackend};
use crate::core::VigilError;
use crate::core::auth::{AuthBackend, HttpAuthBackend};
use crate::core::realtime::{ChannelRegistry, Listener, Subscription, Transport, WebSocketTransport};
use crate::core::session::{FileStore, MemoryStore, SessionManager, SessionStore};
use std::sync::Arc;
use tracing::debug;

/// The two cores a console front end talks to, built from one `Config`.
#[derive(Clone)]
pub struct ConsoleState {
    pub config: Arc<Config>,
    pub session: Arc<SessionManager>,
    pub channels: Arc<ChannelRegistry>,
}

impl ConsoleState {
    /// Builds the HTTP auth backend, the configured session store and the
    /// WebSocket transport. The session still needs `initialize`.
    pub fn from_config(config: Config) -> Result<Self, VigilError> {
        let backend: Arc<dyn AuthBackend> = Arc::new(HttpAuthBackend::new(
            &config.api_base_url,
            config.request_timeout,
        )?);

        let store: Arc<dyn SessionStore> = match config.storage.backend {
            StorageBackend::File => Arc::new(FileStore::new(&config.storage.path)),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let transport: Arc<dyn Transport> = Arc::new(
            WebSocketTransport::new(&config.ws_base_url, config.realtime.reconnect_policy())?
                .with_connect_timeout(config.realtime.connect_timeout),
        );

        Ok(Self::with_parts(config, backend, store, transport))
    }

    /// Assembles a console from explicit collaborators.
    pub fn with_parts(
        config: Config,
        backend: Arc<dyn AuthBackend>,
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            session: Arc::new(SessionManager::new(backend, store)),
            channels: Arc::new(ChannelRegistry::new(transport)),
        }
    }

    /// Subscribes with the session's current access token.
    pub fn subscribe(
        &self,
        channel_key: &str,
        listener: Listener,
    ) -> Result<Subscription, VigilError> {
        let token = self
            .session
            .access_token()
            .filter(|token| !token.is_empty())
            .ok_or(VigilError::NotAuthenticated)?;
        debug!("Subscribing to '{}' with the session token.", channel_key);
        Ok(self.channels.subscribe(channel_key, &token, listener))
    }

    /// Logs out and closes every channel opened under the old session.
    pub async fn logout(&self) {
        self.session.logout().await;
        self.channels.disconnect_all();
    }
}
