//! # mailclerk-recognition
//!
//! Client for the external text-recognition engine.
//!
//! The engine takes image bytes and returns recovered text with a
//! confidence score; no further structure is assumed. The [`Recognizer`]
//! trait keeps the pipeline testable without the engine running.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Result type alias for recognition operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the recognition engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The engine rejected the image or returned an unusable response.
    #[error("Recognition failed: {0}")]
    Recognition(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Text recovered from an image.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveredText {
    /// The recovered text.
    pub text: String,
    /// Engine confidence in [0,1].
    pub confidence: f64,
}

impl RecoveredText {
    /// Clamps the engine's confidence into [0,1].
    ///
    /// Some engines report percentages; anything above 1 is treated as one.
    #[must_use]
    pub fn bounded_confidence(&self) -> f64 {
        self.confidence.clamp(0.0, 1.0)
    }
}

/// Recovers text from image bytes.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognizes the text in one image.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unreachable or rejects the image.
    async fn recognize(&self, image: Bytes) -> Result<RecoveredText>;
}

/// HTTP client posting images to the engine's `recognize` endpoint.
#[derive(Debug, Clone)]
pub struct HttpRecognizer {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpRecognizer {
    /// Creates a client against the engine's base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base = Url::parse(base_url.as_ref())
            .map_err(|e| Error::InvalidConfig(format!("invalid engine URL: {e}")))?;
        let endpoint = base
            .join("recognize")
            .map_err(|e| Error::InvalidConfig(format!("invalid engine URL: {e}")))?;
        Ok(Self {
            endpoint,
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, image: Bytes) -> Result<RecoveredText> {
        debug!(bytes = image.len(), "Submitting image to recognition engine");

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognition(format!("{status}: {body}")));
        }

        let recovered: RecoveredText = response.json().await?;
        debug!(
            chars = recovered.text.len(),
            confidence = recovered.confidence,
            "Recognition complete"
        );
        Ok(recovered)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        let over = RecoveredText {
            text: "NPR 100".to_string(),
            confidence: 97.5,
        };
        assert!((over.bounded_confidence() - 1.0).abs() < f64::EPSILON);

        let under = RecoveredText {
            text: String::new(),
            confidence: -0.5,
        };
        assert!(under.bounded_confidence().abs() < f64::EPSILON);

        let normal = RecoveredText {
            text: "x".to_string(),
            confidence: 0.85,
        };
        assert!((normal.bounded_confidence() - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_engine_url_rejected() {
        assert!(HttpRecognizer::new("not a url").is_err());
    }

    #[test]
    fn test_endpoint_joined() {
        let client = HttpRecognizer::new("http://ocr.internal:9090/").unwrap();
        assert!(client.endpoint.as_str().ends_with("/recognize"));
    }
}
