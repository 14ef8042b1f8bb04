//! Message model types.

use chrono::{DateTime, Utc};

use crate::account::AccountId;
use mailclerk_provider::RemoteMessage;

/// Unique identifier for a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Create a new message ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline processing status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingStatus {
    /// Fetched but not yet run through classification/extraction.
    #[default]
    Pending,
    /// Fully processed; any candidates are staged.
    Processed,
    /// Extraction failed; skipped without failing the sync.
    Failed,
}

impl ProcessingStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processed" => Self::Processed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

/// One fetched mailbox item.
///
/// Immutable once stored except for [`ProcessingStatus`]; uniqueness of
/// `(account_id, provider_id)` is enforced by the schema so re-fetching a
/// message never duplicates it.
#[derive(Debug, Clone)]
pub struct Message {
    /// Unique identifier (None for unsaved messages).
    pub id: Option<MessageId>,
    /// Owning account.
    pub account_id: AccountId,
    /// Provider-native message id, unique per account.
    pub provider_id: String,
    /// Message subject.
    pub subject: String,
    /// Sender address.
    pub sender: String,
    /// When the provider received the message.
    pub received_at: DateTime<Utc>,
    /// Whether the message carries attachments.
    pub has_attachments: bool,
    /// Pipeline processing status.
    pub status: ProcessingStatus,
    /// Body preview captured during processing, for audit.
    pub snippet: Option<String>,
}

impl Message {
    /// Builds an unsaved message from a provider listing entry.
    #[must_use]
    pub fn from_remote(account_id: AccountId, remote: &RemoteMessage) -> Self {
        Self {
            id: None,
            account_id,
            provider_id: remote.id.clone(),
            subject: remote.subject.clone(),
            sender: remote.sender.clone(),
            received_at: remote.received_at,
            has_attachments: remote.has_attachments,
            status: ProcessingStatus::Pending,
            snippet: None,
        }
    }
}
