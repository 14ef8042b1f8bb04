//! Error types for mailbox provider operations.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the mailbox provider.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider rejected the request for quota reasons.
    #[error("Rate limited by provider (retry after {retry_after:?})")]
    RateLimited {
        /// Server-suggested wait before retrying, if sent.
        retry_after: Option<Duration>,
    },

    /// The provider returned a server-side failure.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The access token was rejected.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// The requested message or attachment does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider returned a response the client cannot interpret.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether retrying the same request after a backoff can succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Unavailable(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether the failure means the credential is no longer accepted.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_transient() {
        let err = Error::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert!(err.is_transient());
        assert!(!err.is_auth());
    }

    #[test]
    fn test_unavailable_is_transient() {
        assert!(Error::Unavailable("502".to_string()).is_transient());
    }

    #[test]
    fn test_auth_is_terminal() {
        let err = Error::Auth("token rejected".to_string());
        assert!(!err.is_transient());
        assert!(err.is_auth());
    }

    #[test]
    fn test_not_found_is_terminal() {
        assert!(!Error::NotFound("msg".to_string()).is_transient());
    }
}
