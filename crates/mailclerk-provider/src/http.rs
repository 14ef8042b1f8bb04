//! Reqwest-backed implementation of [`MailApi`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use tracing::debug;
use url::Url;

use crate::api::MailApi;
use crate::error::{Error, Result};
use crate::types::{MessageBody, MessagePage};

/// Default number of messages requested per listing page.
const DEFAULT_PAGE_SIZE: u32 = 100;

/// HTTP client for the provider's REST message API.
#[derive(Debug, Clone)]
pub struct HttpMailClient {
    base_url: Url,
    http: Client,
    page_size: u32,
}

impl HttpMailClient {
    /// Creates a client against the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())
            .map_err(|e| Error::InvalidResponse(format!("invalid base URL: {e}")))?;
        Ok(Self {
            base_url,
            http: Client::new(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Overrides the listing page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::InvalidResponse(format!("invalid endpoint path {path}: {e}")))
    }

    /// Maps a non-success response to the error taxonomy.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        Err(classify_status(status, retry_after, &body))
    }
}

/// Maps an HTTP status to the provider error taxonomy.
fn classify_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> Error {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            retry_after: retry_after.map(Duration::from_secs),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(format!("{status}: {body}"))
        }
        StatusCode::NOT_FOUND => Error::NotFound(body.to_string()),
        s if s.is_server_error() => Error::Unavailable(format!("{status}: {body}")),
        _ => Error::InvalidResponse(format!("unexpected status {status}: {body}")),
    }
}

#[async_trait]
impl MailApi for HttpMailClient {
    async fn list_messages(
        &self,
        access_token: &str,
        since: Option<DateTime<Utc>>,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let mut url = self.endpoint("messages")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page_size", &self.page_size.to_string());
            if let Some(since) = since {
                pairs.append_pair("since", &since.to_rfc3339());
            }
            if let Some(token) = page_token {
                pairs.append_pair("page_token", token);
            }
        }

        debug!(%url, "Listing messages");
        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        let page: MessagePage = Self::check(response).await?.json().await?;
        debug!(
            count = page.messages.len(),
            has_next = page.next_page_token.is_some(),
            "Listed message page"
        );
        Ok(page)
    }

    async fn fetch_body(&self, access_token: &str, provider_id: &str) -> Result<MessageBody> {
        let url = self.endpoint(&format!("messages/{provider_id}"))?;

        debug!(provider_id, "Fetching message body");
        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        let body: MessageBody = Self::check(response).await?.json().await?;
        Ok(body)
    }

    async fn fetch_attachment(
        &self,
        access_token: &str,
        provider_id: &str,
        attachment_id: &str,
    ) -> Result<Bytes> {
        let url = self.endpoint(&format!("messages/{provider_id}/attachments/{attachment_id}"))?;

        debug!(provider_id, attachment_id, "Fetching attachment");
        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes)
    }
}
