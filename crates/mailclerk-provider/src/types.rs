//! Wire types for the mailbox provider API.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A message as returned by the provider's list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteMessage {
    /// Provider-native message identifier, unique within a mailbox.
    pub id: String,
    /// Message subject.
    #[serde(default)]
    pub subject: String,
    /// Sender address.
    #[serde(default)]
    pub sender: String,
    /// When the provider received the message.
    pub received_at: DateTime<Utc>,
    /// Whether the message carries attachments.
    #[serde(default)]
    pub has_attachments: bool,
}

/// One page of a message listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePage {
    /// Messages in provider-returned order.
    pub messages: Vec<RemoteMessage>,
    /// Token for the next page, absent on the last page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Reference to an attachment, fetchable by id.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentRef {
    /// Attachment identifier within the message.
    pub id: String,
    /// Original filename, if the sender supplied one.
    #[serde(default)]
    pub filename: String,
    /// MIME type reported by the provider.
    #[serde(default)]
    pub mime_type: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

impl AttachmentRef {
    /// Whether this attachment is an image the recognition engine can read.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Full body of a message, fetched on demand.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageBody {
    /// Decoded plain-text body.
    #[serde(default)]
    pub text: String,
    /// Attachment references.
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_page_deserializes() {
        let json = r#"{
            "messages": [
                {
                    "id": "m-100",
                    "subject": "Payment receipt",
                    "sender": "alerts@bank.example",
                    "received_at": "2024-03-01T09:30:00Z",
                    "has_attachments": true
                }
            ],
            "next_page_token": "page-2"
        }"#;

        let page: MessagePage = serde_json::from_str(json).unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].id, "m-100");
        assert!(page.messages[0].has_attachments);
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
    }

    #[test]
    fn test_last_page_has_no_token() {
        let json = r#"{"messages": []}"#;
        let page: MessagePage = serde_json::from_str(json).unwrap();
        assert!(page.messages.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_attachment_image_detection() {
        let image = AttachmentRef {
            id: "a1".to_string(),
            filename: "receipt.png".to_string(),
            mime_type: "image/png".to_string(),
            size: 1024,
        };
        let pdf = AttachmentRef {
            id: "a2".to_string(),
            filename: "statement.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size: 2048,
        };
        assert!(image.is_image());
        assert!(!pdf.is_image());
    }
}
