//! Message storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::model::{Message, MessageId, ProcessingStatus};
use crate::account::AccountId;
use crate::store::Database;
use crate::{Error, Result};

/// Repository for fetched messages.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Creates a repository over the shared database.
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Insert a message, or return the existing row for the same
    /// `(account, provider_id)` pair.
    ///
    /// Duplicate re-delivery is expected during re-syncs and is absorbed
    /// here, never surfaced as an error. Returns `true` when the message
    /// was newly inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert(&self, message: &mut Message) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO messages
                (account_id, provider_id, subject, sender, received_at, has_attachments, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, provider_id) DO NOTHING
            ",
        )
        .bind(message.account_id.0)
        .bind(&message.provider_id)
        .bind(&message.subject)
        .bind(&message.sender)
        .bind(message.received_at.to_rfc3339())
        .bind(message.has_attachments)
        .bind(message.status.as_str())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;

        // Load the canonical row either way so the caller sees the stored
        // id and status (re-delivered messages keep their old status).
        let existing = self
            .get_by_provider_id(message.account_id, &message.provider_id)
            .await?
            .ok_or_else(|| Error::Config("message missing after upsert".to_string()))?;
        message.id = existing.id;
        message.status = existing.status;
        message.snippet = existing.snippet;

        if inserted {
            debug!(provider_id = %message.provider_id, "Stored new message");
        }
        Ok(inserted)
    }

    /// Get a message by its provider-native id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_by_provider_id(
        &self,
        account_id: AccountId,
        provider_id: &str,
    ) -> Result<Option<Message>> {
        let row = sqlx::query(
            r"
            SELECT id, account_id, provider_id, subject, sender,
                   received_at, has_attachments, status, snippet
            FROM messages
            WHERE account_id = ? AND provider_id = ?
            ",
        )
        .bind(account_id.0)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_message))
    }

    /// All messages for an account, in received order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r"
            SELECT id, account_id, provider_id, subject, sender,
                   received_at, has_attachments, status, snippet
            FROM messages
            WHERE account_id = ?
            ORDER BY received_at ASC, id ASC
            ",
        )
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_message).collect())
    }

    /// Record the processing outcome for a message, optionally capturing a
    /// body snippet for audit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_status(
        &self,
        id: MessageId,
        status: ProcessingStatus,
        snippet: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE messages
            SET status = ?, snippet = COALESCE(?, snippet)
            WHERE id = ?
            ",
        )
        .bind(status.as_str())
        .bind(snippet)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Convert a database row to a Message.
fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: Some(MessageId::new(row.get("id"))),
        account_id: AccountId::new(row.get("account_id")),
        provider_id: row.get("provider_id"),
        subject: row.get("subject"),
        sender: row.get("sender"),
        received_at: parse_timestamp(row.get("received_at")),
        has_attachments: row.get::<i64, _>("has_attachments") != 0,
        status: ProcessingStatus::parse(row.get("status")),
        snippet: row.get("snippet"),
    }
}

/// Parse a required RFC3339 timestamp column.
fn parse_timestamp(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
