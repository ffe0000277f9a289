// tests/integration/http_auth_test.rs

//! Integration tests for the REST auth backend against a local mock API.
//! Tests: login, refresh, logout, current user, error detail extraction

use super::test_helpers::init_tracing;
use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::Json;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vigil::core::VigilError;
use vigil::core::auth::{AuthBackend, HttpAuthBackend};
use vigil::core::session::{FileStore, LoginCredentials, SessionManager};

/// What the mock API saw: path, Authorization header, JSON body.
type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

fn user_body(role: &str) -> Value {
    json!({
        "user_id": "u-1",
        "username": "alice",
        "role": role,
        "is_active": true,
        "email": "alice@example.com",
        "full_name": "Alice Example",
        "mfa_enabled": false,
        "last_login": "2026-01-05T10:00:00Z"
    })
}

fn token_body(access: &str, refresh: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": 1800,
        "user": user_body("operator")
    })
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn spawn_api(app: Router) -> String {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/v1")
}

/// A well-behaved auth API that records every request.
async fn spawn_recording_api() -> (String, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));

    let login_seen = seen.clone();
    let refresh_seen = seen.clone();
    let logout_seen = seen.clone();
    let me_seen = seen.clone();

    let app = Router::new()
        .route(
            "/api/v1/auth/login",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = login_seen.clone();
                async move {
                    seen.lock()
                        .push(("login".into(), authorization(&headers), body));
                    Json(token_body("access-1", "refresh-1"))
                }
            }),
        )
        .route(
            "/api/v1/auth/refresh",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = refresh_seen.clone();
                async move {
                    seen.lock()
                        .push(("refresh".into(), authorization(&headers), body));
                    Json(token_body("access-2", "refresh-2"))
                }
            }),
        )
        .route(
            "/api/v1/auth/logout",
            post(move |headers: HeaderMap| {
                let seen = logout_seen.clone();
                async move {
                    seen.lock()
                        .push(("logout".into(), authorization(&headers), Value::Null));
                    Json(json!({"message": "Successfully logged out"}))
                }
            }),
        )
        .route(
            "/api/v1/auth/me",
            get(move |headers: HeaderMap| {
                let seen = me_seen.clone();
                async move {
                    seen.lock()
                        .push(("me".into(), authorization(&headers), Value::Null));
                    Json(user_body("viewer"))
                }
            }),
        );

    (spawn_api(app).await, seen)
}

/// An API whose login endpoint always answers with `status` and `body`.
async fn spawn_failing_login(status: StatusCode, body: &'static str) -> String {
    let app = Router::new().route(
        "/api/v1/auth/login",
        post(move || async move { (status, [(header::CONTENT_TYPE, "application/json")], body) }),
    );
    spawn_api(app).await
}

fn backend(base_url: &str) -> HttpAuthBackend {
    HttpAuthBackend::new(base_url, Duration::from_secs(5)).unwrap()
}

// ===== login =====

#[tokio::test]
async fn test_login_posts_credentials() {
    let (base_url, seen) = spawn_recording_api().await;
    let response = backend(&base_url)
        .login(&LoginCredentials::new("alice", "s3cret"))
        .await
        .unwrap();

    assert_eq!(response.access_token, "access-1");
    assert_eq!(response.refresh_token, "refresh-1");
    assert_eq!(response.expires_in, 1800);
    assert_eq!(response.user.id, "u-1");
    assert_eq!(response.user.email.as_deref(), Some("alice@example.com"));
    assert!(response.user.last_login.is_some());

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].2, json!({"username": "alice", "password": "s3cret"}));
    assert_eq!(seen[0].1, None);
}

#[tokio::test]
async fn test_login_includes_mfa_code() {
    let (base_url, seen) = spawn_recording_api().await;
    backend(&base_url)
        .login(&LoginCredentials::new("alice", "s3cret").with_mfa_code("654321"))
        .await
        .unwrap();

    assert_eq!(seen.lock()[0].2["mfa_code"], "654321");
}

#[tokio::test]
async fn test_login_rejection_carries_detail() {
    let base_url = spawn_failing_login(
        StatusCode::UNAUTHORIZED,
        r#"{"detail": "Invalid username or password"}"#,
    )
    .await;

    let err = backend(&base_url)
        .login(&LoginCredentials::new("alice", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        VigilError::Rejected {
            status: 401,
            detail: Some("Invalid username or password".into())
        }
    );
    assert_eq!(err.detail(), Some("Invalid username or password"));
}

#[tokio::test]
async fn test_validation_errors_have_no_detail() {
    let base_url = spawn_failing_login(
        StatusCode::UNPROCESSABLE_ENTITY,
        r#"{"detail": [{"loc": ["body", "username"], "msg": "field required"}]}"#,
    )
    .await;

    let err = backend(&base_url)
        .login(&LoginCredentials::new("", ""))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        VigilError::Rejected {
            status: 422,
            detail: None
        }
    );
}

#[tokio::test]
async fn test_non_json_error_body_has_no_detail() {
    let base_url = spawn_failing_login(StatusCode::BAD_GATEWAY, "upstream unavailable").await;

    let err = backend(&base_url)
        .login(&LoginCredentials::new("alice", "s3cret"))
        .await
        .unwrap_err();
    assert_eq!(err.detail(), None);
    assert!(matches!(err, VigilError::Rejected { status: 502, .. }));
}

#[tokio::test]
async fn test_undecodable_success_is_invalid_response() {
    let base_url = spawn_failing_login(StatusCode::OK, r#"{"token": "wrong shape"}"#).await;

    let err = backend(&base_url)
        .login(&LoginCredentials::new("alice", "s3cret"))
        .await
        .unwrap_err();
    assert!(matches!(err, VigilError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn test_unreachable_api_is_client_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = backend(&format!("http://{addr}/api/v1"))
        .login(&LoginCredentials::new("alice", "s3cret"))
        .await
        .unwrap_err();
    assert!(matches!(err, VigilError::HttpClientError(_)), "{err:?}");
}

#[tokio::test]
async fn test_login_accepts_naive_timestamps() {
    let body = json!({
        "access_token": "access-1",
        "refresh_token": "refresh-1",
        "token_type": "bearer",
        "user": {
            "user_id": "u-1",
            "username": "alice",
            "role": "operator",
            "is_active": true,
            "last_login": "2026-01-05T10:00:00.123456",
            "created_at": "2025-11-30 08:15:00"
        }
    });
    let app = Router::new().route(
        "/api/v1/auth/login",
        post(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    );
    let base_url = spawn_api(app).await;
    let dir = TempDir::new().unwrap();
    let session = SessionManager::new(
        Arc::new(backend(&base_url)),
        Arc::new(FileStore::new(dir.path())),
    );

    let user = session
        .login(&LoginCredentials::new("alice", "s3cret"))
        .await
        .unwrap();

    assert!(session.is_authenticated());
    assert_eq!(
        user.last_login.unwrap().to_rfc3339(),
        "2026-01-05T10:00:00.123456+00:00"
    );
    assert_eq!(
        user.created_at.unwrap().to_rfc3339(),
        "2025-11-30T08:15:00+00:00"
    );
}

#[tokio::test]
async fn test_current_user_ignores_malformed_timestamps() {
    let app = Router::new().route(
        "/api/v1/auth/me",
        get(|| async {
            Json(json!({
                "user_id": "u-1",
                "username": "alice",
                "role": "viewer",
                "is_active": true,
                "last_login": "yesterday",
                "created_at": 1767607200
            }))
        }),
    );
    let base_url = spawn_api(app).await;

    let user = backend(&base_url).current_user("access-1").await.unwrap();
    assert_eq!(user.last_login, None);
    assert_eq!(user.created_at, None);
}

// ===== refresh / logout / me =====

#[tokio::test]
async fn test_refresh_posts_refresh_token() {
    let (base_url, seen) = spawn_recording_api().await;
    let response = backend(&base_url).refresh("refresh-1").await.unwrap();

    assert_eq!(response.access_token, "access-2");
    assert_eq!(seen.lock()[0].2, json!({"refresh_token": "refresh-1"}));
}

#[tokio::test]
async fn test_logout_sends_bearer_token() {
    let (base_url, seen) = spawn_recording_api().await;
    let backend = backend(&base_url);

    backend.logout(Some("access-1")).await.unwrap();
    backend.logout(None).await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen[0].1.as_deref(), Some("Bearer access-1"));
    assert_eq!(seen[1].1, None);
}

#[tokio::test]
async fn test_current_user() {
    let (base_url, seen) = spawn_recording_api().await;
    let user = backend(&base_url).current_user("access-1").await.unwrap();

    assert_eq!(user.role, "viewer");
    assert_eq!(user.full_name.as_deref(), Some("Alice Example"));
    assert_eq!(seen.lock()[0].1.as_deref(), Some("Bearer access-1"));
}

#[tokio::test]
async fn test_trailing_slash_in_base_url() {
    let (base_url, seen) = spawn_recording_api().await;
    let backend = backend(&format!("{base_url}/"));
    assert_eq!(backend.base_url(), base_url);

    backend.refresh("r").await.unwrap();
    assert_eq!(seen.lock().len(), 1);
}

// ===== end to end =====

#[tokio::test]
async fn test_session_survives_restart_with_file_store() {
    let (base_url, seen) = spawn_recording_api().await;
    let dir = TempDir::new().unwrap();

    let first = SessionManager::new(
        Arc::new(backend(&base_url)),
        Arc::new(FileStore::new(dir.path())),
    );
    first.initialize().await;
    first
        .login(&LoginCredentials::new("alice", "s3cret"))
        .await
        .unwrap();

    let second = SessionManager::new(
        Arc::new(backend(&base_url)),
        Arc::new(FileStore::new(dir.path())),
    );
    assert!(second.initialize().await);
    assert_eq!(second.credentials(), first.credentials());

    second.refresh().await.unwrap();
    assert_eq!(second.access_token().as_deref(), Some("access-2"));

    second.logout().await;
    let third = SessionManager::new(
        Arc::new(backend(&base_url)),
        Arc::new(FileStore::new(dir.path())),
    );
    assert!(!third.initialize().await);

    let paths: Vec<String> = seen.lock().iter().map(|(path, ..)| path.clone()).collect();
    assert_eq!(paths, vec!["login", "refresh", "logout"]);
}

#[tokio::test]
async fn test_rejected_login_message_reaches_session_caller() {
    let base_url = spawn_failing_login(
        StatusCode::FORBIDDEN,
        r#"{"detail": "Account is disabled"}"#,
    )
    .await;
    let dir = TempDir::new().unwrap();
    let session = SessionManager::new(
        Arc::new(backend(&base_url)),
        Arc::new(FileStore::new(dir.path())),
    );

    let failure = session
        .login(&LoginCredentials::new("alice", "s3cret"))
        .await
        .unwrap_err();
    assert_eq!(failure.message, "Account is disabled");
    assert_eq!(failure.status, Some(403));
}
