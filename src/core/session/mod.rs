// src/core/session/mod.rs

//! The session manager: login, logout, token refresh, rehydration from
//! storage, and role-based permission checks.
//!
//! A `SessionManager` is an ordinary value. Construct one per console (or per
//! test) and share it behind an `Arc`; nothing here is a process global.

use crate::core::VigilError;
use crate::core::auth::AuthBackend;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OnceCell, watch};
use tracing::{debug, info, warn};

pub mod permissions;
pub mod store;
pub mod user;

pub use store::{FileStore, MemoryStore, SessionStore};
pub use user::{Credentials, LoginCredentials, TokenResponse, User};

/// The storage key holding the serialized `Credentials` record.
pub const AUTH_STORAGE_KEY: &str = "surveillance_auth";

/// Message used when a failed login carries no displayable detail.
pub const DEFAULT_LOGIN_ERROR: &str = "Login failed";

/// A failed login, with a message fit to show the person at the keyboard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct LoginFailure {
    pub message: String,
    /// HTTP status of the backend refusal, when the backend answered at all.
    pub status: Option<u16>,
}

impl LoginFailure {
    fn from_error(err: &VigilError) -> Self {
        let status = match err {
            VigilError::Rejected { status, .. } => Some(*status),
            _ => None,
        };
        Self {
            message: err.detail().unwrap_or(DEFAULT_LOGIN_ERROR).to_string(),
            status,
        }
    }
}

/// A read-only view of the session, as published to watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

#[derive(Debug)]
struct SessionState {
    /// The user/token triple. `None` means logged out.
    credentials: Option<Credentials>,
    /// True until `initialize` has finished its one storage read.
    is_loading: bool,
}

impl SessionState {
    fn is_authenticated(&self) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(|c| !c.access_token.is_empty())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user: self.credentials.as_ref().map(|c| c.user.clone()),
            is_authenticated: self.is_authenticated(),
            is_loading: self.is_loading,
        }
    }
}

/// Owns the session triple and every operation that changes it.
pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn SessionStore>,
    state: RwLock<SessionState>,
    /// Set once the storage read in `initialize` has completed.
    rehydrated: OnceCell<()>,
    changes: watch::Sender<SessionSnapshot>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Tokens stay out of debug output.
        f.debug_struct("SessionManager")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates an empty, still-loading session. Call `initialize` before
    /// making permission decisions.
    pub fn new(backend: Arc<dyn AuthBackend>, store: Arc<dyn SessionStore>) -> Self {
        let state = SessionState {
            credentials: None,
            is_loading: true,
        };
        let (changes, _) = watch::channel(state.snapshot());
        Self {
            backend,
            store,
            state: RwLock::new(state),
            rehydrated: OnceCell::new(),
            changes,
        }
    }

    /// Rehydrates the session from storage.
    ///
    /// A missing record leaves the session empty. A record that cannot be
    /// decoded (or that holds an empty access token) is discarded and removed
    /// from storage. Either way `is_loading` ends up false. Only the first
    /// call reads storage; calls made while that read is in flight wait for
    /// it, and later calls just report the current state.
    ///
    /// Returns whether the session is authenticated afterwards.
    pub async fn initialize(&self) -> bool {
        self.rehydrated.get_or_init(|| self.rehydrate()).await;
        self.is_authenticated()
    }

    async fn rehydrate(&self) {
        let restored = match self.store.read(AUTH_STORAGE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Credentials>(&raw) {
                Ok(credentials) if !credentials.access_token.is_empty() => Some(credentials),
                Ok(_) => {
                    debug!("Persisted session has an empty access token. Discarding it.");
                    self.discard_persisted().await;
                    None
                }
                Err(e) => {
                    debug!("Persisted session is corrupt ({}). Discarding it.", e);
                    self.discard_persisted().await;
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read persisted session: {}. Starting logged out.", e);
                self.discard_persisted().await;
                None
            }
        };

        if let Some(credentials) = &restored {
            info!("Restored session for user '{}'.", credentials.user.username);
        }

        self.update(|state| {
            if restored.is_some() {
                state.credentials = restored;
            }
            state.is_loading = false;
        });
    }

    /// Authenticates against the backend and installs the returned session.
    ///
    /// On failure the session is left exactly as it was.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, LoginFailure> {
        let response = match self.backend.login(credentials).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Login for '{}' failed: {}", credentials.username, e);
                return Err(LoginFailure::from_error(&e));
            }
        };

        if response.access_token.is_empty() {
            warn!("Auth backend issued an empty access token. Treating login as failed.");
            return Err(LoginFailure::from_error(&VigilError::InvalidResponse(
                "empty access token".into(),
            )));
        }

        let credentials = Credentials::from(response);
        let user = credentials.user.clone();
        self.install(credentials).await;
        info!("User '{}' logged in as '{}'.", user.username, user.role);
        Ok(user)
    }

    /// Ends the session. Backend notification is best-effort; local state and
    /// storage are always cleared.
    pub async fn logout(&self) {
        let access_token = self.access_token();
        if let Err(e) = self.backend.logout(access_token.as_deref()).await {
            debug!("Ignoring logout notification failure: {}", e);
        }
        self.clear().await;
        info!("Session cleared by logout.");
    }

    /// Swaps the refresh token for a fresh triple.
    ///
    /// Without a refresh token this fails immediately and never touches the
    /// network. A backend failure ends the session through `logout` and is
    /// returned to the caller; it is not retried.
    pub async fn refresh(&self) -> Result<User, VigilError> {
        let Some(refresh_token) = self.refresh_token() else {
            return Err(VigilError::NoRefreshToken);
        };

        let result = match self.backend.refresh(&refresh_token).await {
            Ok(response) if response.access_token.is_empty() => Err(
                VigilError::InvalidResponse("empty access token in refresh response".into()),
            ),
            other => other,
        };

        match result {
            Ok(response) => {
                let credentials = Credentials::from(response);
                let user = credentials.user.clone();
                self.install(credentials).await;
                debug!("Refreshed session for user '{}'.", user.username);
                Ok(user)
            }
            Err(e) => {
                warn!("Token refresh failed: {}. Ending session.", e);
                self.logout().await;
                Err(e)
            }
        }
    }

    /// Re-fetches the current user from the backend, keeping the tokens.
    ///
    /// If the session changed while the request was in flight the fresh user
    /// is returned but not installed.
    pub async fn reload_user(&self) -> Result<User, VigilError> {
        let Some(credentials) = self.credentials() else {
            return Err(VigilError::NotAuthenticated);
        };

        let user = self.backend.current_user(&credentials.access_token).await?;

        let updated = {
            let mut state = self.state.write();
            match state.credentials.as_mut() {
                Some(current) if current.access_token == credentials.access_token => {
                    current.user = user.clone();
                    Some(current.clone())
                }
                _ => None,
            }
        };

        if let Some(updated) = updated {
            self.publish();
            self.persist(&updated).await;
        }
        Ok(user)
    }

    /// Drops the session after the API reported the access token as invalid
    /// (HTTP 401). The backend is not notified.
    pub async fn handle_unauthorized(&self) {
        if self.is_authenticated() {
            info!("Access token rejected by the API. Clearing session.");
        }
        self.clear().await;
    }

    /// Fail-closed permission check against the current user's role.
    pub fn has_permission(&self, permission: &str) -> bool {
        let state = self.state.read();
        match &state.credentials {
            Some(credentials) => {
                permissions::role_has_permission(&credentials.user.role, permission)
            }
            None => false,
        }
    }

    pub fn user(&self) -> Option<User> {
        self.state.read().credentials.as_ref().map(|c| c.user.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .credentials
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state
            .read()
            .credentials
            .as_ref()
            .map(|c| c.refresh_token.clone())
    }

    /// The whole triple, if logged in.
    pub fn credentials(&self) -> Option<Credentials> {
        self.state.read().credentials.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().is_loading
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.read().snapshot()
    }

    /// Subscribes to session changes. The receiver starts at the current state.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.changes.subscribe()
    }

    /// Replaces the triple in memory, then persists it.
    async fn install(&self, credentials: Credentials) {
        self.update(|state| state.credentials = Some(credentials.clone()));
        self.persist(&credentials).await;
    }

    /// Clears the triple in memory, then removes the persisted record.
    async fn clear(&self) {
        self.update(|state| state.credentials = None);
        self.discard_persisted().await;
    }

    async fn persist(&self, credentials: &Credentials) {
        let serialized = match serde_json::to_string(credentials) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize session for storage: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.write(AUTH_STORAGE_KEY, &serialized).await {
            warn!("Failed to persist session: {}", e);
        }
    }

    async fn discard_persisted(&self) {
        if let Err(e) = self.store.remove(AUTH_STORAGE_KEY).await {
            warn!("Failed to remove persisted session: {}", e);
        }
    }

    fn update(&self, mutate: impl FnOnce(&mut SessionState)) {
        {
            let mut state = self.state.write();
            mutate(&mut state);
        }
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.changes.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
