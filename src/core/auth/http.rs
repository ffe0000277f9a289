// src/core/auth/http.rs

//! `AuthBackend` over the platform's REST API.

use super::AuthBackend;
use crate::core::VigilError;
use crate::core::session::{LoginCredentials, TokenResponse, User};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Talks to `<base_url>/auth/*` with JSON bodies and bearer tokens.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    client: Client,
    base_url: String,
}

impl HttpAuthBackend {
    /// Builds a backend for `base_url` (e.g. `http://localhost:8000/api/v1`)
    /// whose requests give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, VigilError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Uses a caller-supplied client, e.g. one with extra default headers.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, VigilError> {
        let res = request.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        // Error bodies look like `{"detail": "..."}`. Validation errors carry
        // a list instead of a string; those have no displayable detail.
        let body = res.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string));
        debug!("Auth backend responded with status {}", status);
        Err(VigilError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }

    async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, VigilError> {
        let bytes = res.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            VigilError::InvalidResponse(format!("could not decode auth response: {e}"))
        })
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, credentials: &LoginCredentials) -> Result<TokenResponse, VigilError> {
        let request = self
            .client
            .post(self.endpoint("auth/login"))
            .json(credentials);
        let res = self.send(request).await?;
        Self::decode(res).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, VigilError> {
        let request = self
            .client
            .post(self.endpoint("auth/refresh"))
            .json(&json!({ "refresh_token": refresh_token }));
        let res = self.send(request).await?;
        Self::decode(res).await
    }

    async fn logout(&self, access_token: Option<&str>) -> Result<(), VigilError> {
        let mut request = self.client.post(self.endpoint("auth/logout"));
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        self.send(request).await?;
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<User, VigilError> {
        let request = self
            .client
            .get(self.endpoint("auth/me"))
            .bearer_auth(access_token);
        let res = self.send(request).await?;
        Self::decode(res).await
    }
}
