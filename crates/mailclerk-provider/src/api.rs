//! The mailbox provider trait consumed by the sync pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{MessageBody, MessagePage};

/// Operations the sync pipeline needs from a mailbox provider.
///
/// Listing is paginated and restartable from a page token. Bodies and
/// attachments are fetched on demand rather than eagerly, to bound memory
/// and API quota use.
#[async_trait]
pub trait MailApi: Send + Sync {
    /// Lists messages received after `since`, oldest first.
    ///
    /// Pass the `next_page_token` from the previous page to continue a
    /// listing; `None` starts from the beginning.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RateLimited`] / [`crate::Error::Unavailable`]
    /// for retryable provider failures and [`crate::Error::Auth`] when the
    /// token is rejected.
    async fn list_messages(
        &self,
        access_token: &str,
        since: Option<DateTime<Utc>>,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    /// Fetches the decoded body and attachment references for one message.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`MailApi::list_messages`], plus
    /// [`crate::Error::NotFound`] for an unknown message id.
    async fn fetch_body(&self, access_token: &str, provider_id: &str) -> Result<MessageBody>;

    /// Fetches one attachment's raw bytes.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`MailApi::fetch_body`].
    async fn fetch_attachment(
        &self,
        access_token: &str,
        provider_id: &str,
        attachment_id: &str,
    ) -> Result<Bytes>;
}
