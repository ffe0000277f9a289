// src/core/errors.rs

//! Defines the primary error type for the entire crate.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure the session and realtime
/// core can report. `thiserror` provides the `Display` and `Error` impls.
#[derive(Error, Debug)]
pub enum VigilError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    /// The auth backend answered with a non-success status.
    /// `detail` holds the human-readable message from the error body, if any.
    #[error("Backend rejected the request ({status}): {}", describe_detail(.detail))]
    Rejected { status: u16, detail: Option<String> },

    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_detail(detail: &Option<String>) -> &str {
    detail.as_deref().unwrap_or("no detail")
}

impl VigilError {
    /// Returns the backend-provided `detail` message, if this error carries one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            VigilError::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for VigilError {
    fn clone(&self) -> Self {
        match self {
            VigilError::Io(e) => VigilError::Io(Arc::clone(e)),
            VigilError::HttpClientError(s) => VigilError::HttpClientError(s.clone()),
            VigilError::Rejected { status, detail } => VigilError::Rejected {
                status: *status,
                detail: detail.clone(),
            },
            VigilError::InvalidResponse(s) => VigilError::InvalidResponse(s.clone()),
            VigilError::Storage(s) => VigilError::Storage(s.clone()),
            VigilError::Transport(s) => VigilError::Transport(s.clone()),
            VigilError::NoRefreshToken => VigilError::NoRefreshToken,
            VigilError::NotAuthenticated => VigilError::NotAuthenticated,
            VigilError::InvalidConfig(s) => VigilError::InvalidConfig(s.clone()),
            VigilError::Internal(s) => VigilError::Internal(s.clone()),
        }
    }
}

impl PartialEq for VigilError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VigilError::Io(e1), VigilError::Io(e2)) => e1.to_string() == e2.to_string(),
            (VigilError::HttpClientError(s1), VigilError::HttpClientError(s2)) => s1 == s2,
            (
                VigilError::Rejected {
                    status: s1,
                    detail: d1,
                },
                VigilError::Rejected {
                    status: s2,
                    detail: d2,
                },
            ) => s1 == s2 && d1 == d2,
            (VigilError::InvalidResponse(s1), VigilError::InvalidResponse(s2)) => s1 == s2,
            (VigilError::Storage(s1), VigilError::Storage(s2)) => s1 == s2,
            (VigilError::Transport(s1), VigilError::Transport(s2)) => s1 == s2,
            (VigilError::InvalidConfig(s1), VigilError::InvalidConfig(s2)) => s1 == s2,
            (VigilError::Internal(s1), VigilError::Internal(s2)) => s1 == s2,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for VigilError {
    fn from(e: std::io::Error) -> Self {
        VigilError::Io(Arc::new(e))
    }
}

impl From<reqwest::Error> for VigilError {
    fn from(e: reqwest::Error) -> Self {
        VigilError::HttpClientError(e.to_string())
    }
}

impl From<serde_json::Error> for VigilError {
    fn from(e: serde_json::Error) -> Self {
        VigilError::InvalidResponse(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<url::ParseError> for VigilError {
    fn from(e: url::ParseError) -> Self {
        VigilError::InvalidConfig(format!("invalid URL: {e}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VigilError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        VigilError::Transport(e.to_string())
    }
}
