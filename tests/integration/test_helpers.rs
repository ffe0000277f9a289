// tests/integration/test_helpers.rs

//! Test doubles and utilities shared by the unit, integration and property tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use vigil::core::VigilError;
use vigil::core::auth::AuthBackend;
use vigil::core::realtime::transport::connection_pair;
use vigil::core::realtime::{ChannelEvent, ConnectionSink, Listener, Transport, TransportConnection};
use vigil::core::session::{
    LoginCredentials, MemoryStore, SessionManager, TokenResponse, User,
};

/// Installs a quiet test subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

pub fn user(id: &str, username: &str, role: &str) -> User {
    User::new(id, username, role)
}

pub fn token_response(user: User, access: &str, refresh: &str) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        token_type: "bearer".to_string(),
        expires_in: 3600,
        user,
    }
}

pub fn rejected(status: u16, detail: Option<&str>) -> VigilError {
    VigilError::Rejected {
        status,
        detail: detail.map(str::to_string),
    }
}

/// A scripted `AuthBackend` that records how it was called.
pub struct MockAuthBackend {
    login_response: Mutex<Result<TokenResponse, VigilError>>,
    refresh_response: Mutex<Result<TokenResponse, VigilError>>,
    logout_response: Mutex<Result<(), VigilError>>,
    me_response: Mutex<Result<User, VigilError>>,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub logins_seen: Mutex<Vec<LoginCredentials>>,
    pub refresh_tokens_seen: Mutex<Vec<String>>,
    pub logout_tokens_seen: Mutex<Vec<Option<String>>>,
}

impl MockAuthBackend {
    /// Logs everyone in as `alice` (operator) and refreshes to a second token pair.
    pub fn new() -> Self {
        let alice = user("u-1", "alice", "operator");
        Self {
            login_response: Mutex::new(Ok(token_response(alice.clone(), "access-1", "refresh-1"))),
            refresh_response: Mutex::new(Ok(token_response(
                alice.clone(),
                "access-2",
                "refresh-2",
            ))),
            logout_response: Mutex::new(Ok(())),
            me_response: Mutex::new(Ok(alice)),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            logins_seen: Mutex::new(Vec::new()),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            logout_tokens_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn set_login(&self, response: Result<TokenResponse, VigilError>) {
        *self.login_response.lock() = response;
    }

    pub fn set_refresh(&self, response: Result<TokenResponse, VigilError>) {
        *self.refresh_response.lock() = response;
    }

    pub fn set_logout(&self, response: Result<(), VigilError>) {
        *self.logout_response.lock() = response;
    }

    pub fn set_me(&self, response: Result<User, VigilError>) {
        *self.me_response.lock() = response;
    }

    pub fn logins(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn login(&self, credentials: &LoginCredentials) -> Result<TokenResponse, VigilError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.logins_seen.lock().push(credentials.clone());
        self.login_response.lock().clone()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, VigilError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen
            .lock()
            .push(refresh_token.to_string());
        self.refresh_response.lock().clone()
    }

    async fn logout(&self, access_token: Option<&str>) -> Result<(), VigilError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logout_tokens_seen
            .lock()
            .push(access_token.map(str::to_string));
        self.logout_response.lock().clone()
    }

    async fn current_user(&self, _access_token: &str) -> Result<User, VigilError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        self.me_response.lock().clone()
    }
}

/// A session manager over a fresh mock backend and in-memory store.
pub struct SessionFixture {
    pub backend: Arc<MockAuthBackend>,
    pub store: Arc<MemoryStore>,
    pub session: SessionManager,
}

impl SessionFixture {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        init_tracing();
        let backend = Arc::new(MockAuthBackend::new());
        let store = Arc::new(store);
        let session = SessionManager::new(backend.clone(), store.clone());
        Self {
            backend,
            store,
            session,
        }
    }

    /// Initializes and logs in as the backend's default user.
    pub async fn logged_in() -> Self {
        let fixture = Self::new();
        fixture.session.initialize().await;
        fixture
            .session
            .login(&LoginCredentials::new("alice", "secret"))
            .await
            .expect("default login should succeed");
        fixture
    }

    /// Initializes and logs in with a user of the given role.
    pub async fn logged_in_as(role: &str) -> Self {
        let fixture = Self::new();
        fixture.backend.set_login(Ok(token_response(
            user("u-9", "someone", role),
            "access-role",
            "refresh-role",
        )));
        fixture.session.initialize().await;
        fixture
            .session
            .login(&LoginCredentials::new("someone", "secret"))
            .await
            .expect("role login should succeed");
        fixture
    }
}

/// A `Transport` that never touches the network. Tests drive each opened
/// connection through the `ConnectionSink` it hands out.
#[derive(Default)]
pub struct MockTransport {
    opened: Mutex<HashMap<String, Vec<ConnectionSink>>>,
    opens: Mutex<HashMap<String, usize>>,
    tokens: Mutex<Vec<(String, String)>>,
    total_opens: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn open_count(&self, key: &str) -> usize {
        self.opens.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total_opens(&self) -> usize {
        self.total_opens.load(Ordering::SeqCst)
    }

    /// The sink of the most recent connection opened for `key`.
    pub fn sink(&self, key: &str) -> ConnectionSink {
        self.opened
            .lock()
            .get(key)
            .and_then(|sinks| sinks.last().cloned())
            .unwrap_or_else(|| panic!("no connection opened for '{key}'"))
    }

    pub fn tokens(&self) -> Vec<(String, String)> {
        self.tokens.lock().clone()
    }

    /// Drops every sink held for `key`, as a transport does once it gives up.
    pub fn finish(&self, key: &str) {
        self.opened.lock().remove(key);
    }
}

impl Transport for MockTransport {
    fn open(&self, channel_key: &str, token: &str) -> TransportConnection {
        let (sink, connection) = connection_pair();
        self.total_opens.fetch_add(1, Ordering::SeqCst);
        *self.opens.lock().entry(channel_key.to_string()).or_default() += 1;
        self.opened
            .lock()
            .entry(channel_key.to_string())
            .or_default()
            .push(sink);
        self.tokens
            .lock()
            .push((channel_key.to_string(), token.to_string()));
        connection
    }
}

/// A listener that appends every event it sees to a shared vector.
pub fn recording_listener() -> (Listener, Arc<Mutex<Vec<ChannelEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let listener: Listener = Arc::new(move |event: &ChannelEvent| {
        sink.lock().push(event.clone());
    });
    (listener, events)
}

/// Polls `condition` every few milliseconds for up to two seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Gives spawned tasks a chance to run, for asserting that something did
/// *not* happen.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
