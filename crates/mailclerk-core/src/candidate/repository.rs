//! Candidate storage and approval staging.
//!
//! This is the only write path into the approval queue from the pipeline.
//! Staging deduplicates against existing candidates for the same message
//! and extraction source, so re-processing a message after a retried sync
//! is idempotent.

use chrono::{NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::model::{ApprovalStatus, Candidate, CandidateId, Decision, Source};
use crate::account::UserId;
use crate::extract::Extraction;
use crate::message::{Message, MessageId};
use crate::store::Database;
use crate::{Error, Result};

/// Fallback merchant when no pattern captured one.
const UNKNOWN_MERCHANT: &str = "unknown";

/// Repository for transaction candidates.
#[derive(Debug, Clone)]
pub struct CandidateRepository {
    pool: SqlitePool,
}

impl CandidateRepository {
    /// Creates a repository over the shared database.
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Stage an extraction as a pending-approval candidate.
    ///
    /// Missing merchant falls back to `"unknown"`, missing date to the
    /// message received date. If a candidate for the same `(message,
    /// source)` already exists, it is returned untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is unsaved or a database query
    /// fails.
    pub async fn stage(
        &self,
        user_id: UserId,
        message: &Message,
        extraction: &Extraction,
    ) -> Result<Candidate> {
        let message_id = message
            .id
            .ok_or_else(|| Error::Config("cannot stage against an unsaved message".to_string()))?;

        if let Some(existing) = self.get_for_message(message_id, extraction.source).await? {
            debug!(
                candidate = %existing.id.unwrap_or(CandidateId::new(0)),
                source = extraction.source.as_str(),
                "Duplicate extraction absorbed by staging"
            );
            return Ok(existing);
        }

        let mut candidate = Candidate {
            id: None,
            user_id,
            message_id: Some(message_id),
            amount: extraction.amount,
            currency: extraction.currency.clone(),
            merchant: extraction
                .merchant
                .clone()
                .unwrap_or_else(|| UNKNOWN_MERCHANT.to_string()),
            txn_date: extraction
                .date
                .unwrap_or_else(|| message.received_at.date_naive()),
            confidence: extraction.confidence,
            source: extraction.source,
            status: ApprovalStatus::Pending,
            raw_payload: serde_json::to_value(extraction)?,
            decided_at: None,
        };
        candidate.clamp_confidence();

        self.insert(&mut candidate).await?;
        Ok(candidate)
    }

    /// Stage a manually entered candidate, unconnected to any message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn stage_manual(
        &self,
        user_id: UserId,
        amount: f64,
        currency: &str,
        merchant: &str,
        txn_date: NaiveDate,
    ) -> Result<Candidate> {
        let mut candidate = Candidate {
            id: None,
            user_id,
            message_id: None,
            amount,
            currency: currency.to_string(),
            merchant: merchant.to_string(),
            txn_date,
            confidence: 1.0,
            source: Source::Manual,
            status: ApprovalStatus::Pending,
            raw_payload: serde_json::Value::Null,
            decided_at: None,
        };

        self.insert(&mut candidate).await?;
        Ok(candidate)
    }

    async fn insert(&self, candidate: &mut Candidate) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO candidates
                (user_id, message_id, amount, currency, merchant, txn_date,
                 confidence, source, status, raw_payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(candidate.user_id.0)
        .bind(candidate.message_id.map(|id| id.0))
        .bind(candidate.amount)
        .bind(&candidate.currency)
        .bind(&candidate.merchant)
        .bind(candidate.txn_date.to_string())
        .bind(candidate.confidence)
        .bind(candidate.source.as_str())
        .bind(candidate.status.as_str())
        .bind(candidate.raw_payload.to_string())
        .execute(&self.pool)
        .await?;

        candidate.id = Some(CandidateId::new(result.last_insert_rowid()));
        debug!(
            candidate = %CandidateId::new(result.last_insert_rowid()),
            amount = candidate.amount,
            currency = %candidate.currency,
            "Candidate staged for approval"
        );
        Ok(())
    }

    /// Get a candidate by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: CandidateId) -> Result<Option<Candidate>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, message_id, amount, currency, merchant,
                   txn_date, confidence, source, status, raw_payload, decided_at
            FROM candidates
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_candidate))
    }

    /// The candidate staged for a message from a given extraction source.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_for_message(
        &self,
        message_id: MessageId,
        source: Source,
    ) -> Result<Option<Candidate>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, message_id, amount, currency, merchant,
                   txn_date, confidence, source, status, raw_payload, decided_at
            FROM candidates
            WHERE message_id = ? AND source = ?
            ",
        )
        .bind(message_id.0)
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_candidate))
    }

    /// All pending candidates for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_pending(&self, user_id: UserId) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, message_id, amount, currency, merchant,
                   txn_date, confidence, source, status, raw_payload, decided_at
            FROM candidates
            WHERE user_id = ? AND status = 'pending'
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_candidate).collect())
    }

    /// Apply a human decision to a pending candidate.
    ///
    /// Decisions are one-way: the conditional update only matches rows
    /// still pending, so deciding twice fails rather than flipping the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDecided`] when the candidate was decided
    /// before, or [`Error::CandidateNotFound`] when it does not exist.
    pub async fn decide(&self, id: CandidateId, decision: Decision) -> Result<Candidate> {
        let status = decision.resulting_status();
        let result = sqlx::query(
            r"
            UPDATE candidates
            SET status = ?, decided_at = ?
            WHERE id = ? AND status = 'pending'
            ",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(_) => Err(Error::AlreadyDecided(id.0)),
                None => Err(Error::CandidateNotFound(id.0)),
            };
        }

        debug!(candidate = %id, status = status.as_str(), "Candidate decided");
        self.get(id)
            .await?
            .ok_or(Error::CandidateNotFound(id.0))
    }
}

/// Convert a database row to a Candidate.
fn row_to_candidate(row: &sqlx::sqlite::SqliteRow) -> Candidate {
    let raw: String = row.get("raw_payload");
    Candidate {
        id: Some(CandidateId::new(row.get("id"))),
        user_id: UserId::new(row.get("user_id")),
        message_id: row.get::<Option<i64>, _>("message_id").map(MessageId::new),
        amount: row.get("amount"),
        currency: row.get("currency"),
        merchant: row.get("merchant"),
        txn_date: row
            .get::<String, _>("txn_date")
            .parse()
            .unwrap_or_default(),
        confidence: row.get("confidence"),
        source: Source::parse(row.get("source")),
        status: ApprovalStatus::parse(row.get("status")),
        raw_payload: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
        decided_at: row
            .get::<Option<String>, _>("decided_at")
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}
