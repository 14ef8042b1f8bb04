//! Error types for `OAuth2` operations.

use std::io;

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `OAuth2` error from server.
    #[error("OAuth2 error: {error} - {description}")]
    OAuth {
        /// Error code (e.g., `invalid_grant`).
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// Token expired.
    #[error("Token expired")]
    TokenExpired,

    /// No refresh token available.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Refresh was rejected by the provider (revoked consent or invalid
    /// refresh token). The user must re-authorize.
    #[error("Refresh rejected by provider: {0}")]
    RefreshRejected(String),

    /// Invalid token response.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    /// Creates an OAuth error from error code and description.
    ///
    /// `invalid_grant` responses map to [`Error::RefreshRejected`] because
    /// they mean the refresh token itself is no longer usable.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        let error = error.into();
        let description = description.into();
        if error == "invalid_grant" {
            Self::RefreshRejected(description)
        } else {
            Self::OAuth { error, description }
        }
    }

    /// Whether this error is terminal for the stored credential, meaning the
    /// user must go through authorization again.
    #[must_use]
    pub const fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::RefreshRejected(_) | Self::NoRefreshToken)
    }
}
