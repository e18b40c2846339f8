//! Error types for the storage adapter.
//!
//! Data operations on [`KvAdapter`](crate::KvAdapter) never return these to
//! callers; they are logged and degrade. Only remote configuration surfaces
//! [`ConfigureError`].

use std::time::Duration;

use http::StatusCode;

/// Failure talking to the remote document API.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote API rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },
    #[error("remote credentials rejected (401)")]
    Unauthorized,
    #[error("remote access forbidden (403): {message}")]
    Forbidden { message: String },
    #[error("remote document not found (404)")]
    NotFound,
    #[error("remote API returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("remote transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the same request can be expected to succeed later without any
    /// change in configuration.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Status { status, .. } => status.is_server_error(),
            Self::Unauthorized | Self::Forbidden { .. } | Self::NotFound | Self::Decode(_) => {
                false
            }
        }
    }

    /// Whether this is a rate-limit rejection.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Short label for metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound => "not_found",
            Self::Status { .. } => "status",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
        }
    }
}

/// Failure reading or writing the local storage area.
#[derive(Debug, thiserror::Error)]
pub enum LocalStorageError {
    #[error("local storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("local storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("local storage area is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Failure configuring the remote backend. Shown to the administrator.
#[derive(Debug, thiserror::Error)]
pub enum ConfigureError {
    #[error("an access token is required")]
    MissingToken,
    #[error("failed to create remote document: {0}")]
    Create(#[source] RemoteError),
    #[error("failed to persist remote credentials: {0}")]
    Persist(#[from] LocalStorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(RemoteError::RateLimited { retry_after: None }.is_retryable());
        assert!(RemoteError::Status {
            status: StatusCode::BAD_GATEWAY,
            message: String::new()
        }
        .is_retryable());

        assert!(!RemoteError::Unauthorized.is_retryable());
        assert!(!RemoteError::Forbidden {
            message: "Resource not accessible".into()
        }
        .is_retryable());
        assert!(!RemoteError::NotFound.is_retryable());
        assert!(!RemoteError::Status {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(RemoteError::Unauthorized.kind(), "unauthorized");
        assert_eq!(
            RemoteError::RateLimited { retry_after: None }.kind(),
            "rate_limited"
        );
        assert!(RemoteError::RateLimited { retry_after: None }.is_rate_limited());
        assert!(!RemoteError::NotFound.is_rate_limited());
    }

    #[test]
    fn configure_error_messages() {
        assert_eq!(
            ConfigureError::MissingToken.to_string(),
            "an access token is required"
        );
        let err = ConfigureError::Create(RemoteError::Unauthorized);
        assert!(err.to_string().contains("401"));
    }
}
