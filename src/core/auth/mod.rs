// src/core/auth/mod.rs

//! The auth backend seam: the remote service that issues and revokes tokens.

use crate::core::VigilError;
use crate::core::session::{LoginCredentials, TokenResponse, User};
use async_trait::async_trait;

pub mod http;

pub use http::HttpAuthBackend;

/// The operations the session manager needs from the auth service.
///
/// Implementations report backend refusals as `VigilError::Rejected` with the
/// body's `detail` message when one was provided.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchanges a username and password for a token pair and user.
    async fn login(&self, credentials: &LoginCredentials) -> Result<TokenResponse, VigilError>;

    /// Exchanges a refresh token for a new token pair and user.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, VigilError>;

    /// Tells the backend the session is over.
    async fn logout(&self, access_token: Option<&str>) -> Result<(), VigilError>;

    /// Fetches the user the access token belongs to.
    async fn current_user(&self, access_token: &str) -> Result<User, VigilError>;
}
