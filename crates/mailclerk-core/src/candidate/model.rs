//! Candidate model types.

use chrono::{DateTime, NaiveDate, Utc};

use crate::account::UserId;
use crate::message::MessageId;

/// Unique identifier for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateId(pub i64);

impl CandidateId {
    /// Create a new candidate ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a candidate's fields were extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Source {
    /// Pattern match over the message text.
    #[default]
    TextPattern,
    /// Pattern match over text recovered from an image attachment.
    RecognitionEngine,
    /// Entered by the user, not tied to a message.
    Manual,
}

impl Source {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "recognition-engine" => Self::RecognitionEngine,
            "manual" => Self::Manual,
            _ => Self::TextPattern,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TextPattern => "text-pattern",
            Self::RecognitionEngine => "recognition-engine",
            Self::Manual => "manual",
        }
    }
}

/// Approval status of a candidate. Transitions are one-way:
/// pending → approved or pending → rejected, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalStatus {
    /// Awaiting human review.
    #[default]
    Pending,
    /// Confirmed as a real transaction.
    Approved,
    /// Dismissed by the user.
    Rejected,
}

impl ApprovalStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// A reviewer's verdict on a pending candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Confirm the transaction.
    Approve,
    /// Dismiss the candidate.
    Reject,
}

impl Decision {
    /// The approval status this decision results in.
    #[must_use]
    pub const fn resulting_status(self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// One proposed transaction awaiting human approval.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Unique identifier (None for unsaved candidates).
    pub id: Option<CandidateId>,
    /// Owning user.
    pub user_id: UserId,
    /// Source message; None only for manually entered candidates.
    pub message_id: Option<MessageId>,
    /// Extracted amount. Mandatory: a candidate without an amount is never
    /// staged.
    pub amount: f64,
    /// Currency code.
    pub currency: String,
    /// Merchant text ("unknown" when nothing was extracted).
    pub merchant: String,
    /// Transaction date (message received date when none was extracted).
    pub txn_date: NaiveDate,
    /// Extraction confidence, clamped to [0,1].
    pub confidence: f64,
    /// Where the fields came from.
    pub source: Source,
    /// Approval status.
    pub status: ApprovalStatus,
    /// Raw extracted payload kept for audit.
    pub raw_payload: serde_json::Value,
    /// When the candidate was approved or rejected.
    pub decided_at: Option<DateTime<Utc>>,
}

impl Candidate {
    /// Clamps the confidence into [0,1], matching the schema constraint.
    pub fn clamp_confidence(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }

    /// Whether this candidate still awaits a decision.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, ApprovalStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_roundtrip() {
        for source in [Source::TextPattern, Source::RecognitionEngine, Source::Manual] {
            assert_eq!(Source::parse(source.as_str()), source);
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
        ] {
            assert_eq!(ApprovalStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_decision_maps_to_status() {
        assert_eq!(Decision::Approve.resulting_status(), ApprovalStatus::Approved);
        assert_eq!(Decision::Reject.resulting_status(), ApprovalStatus::Rejected);
    }

    #[test]
    fn test_confidence_clamped() {
        let mut candidate = Candidate {
            id: None,
            user_id: UserId::new(1),
            message_id: None,
            amount: 10.0,
            currency: "NPR".to_string(),
            merchant: "unknown".to_string(),
            txn_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default(),
            confidence: 1.7,
            source: Source::Manual,
            status: ApprovalStatus::Pending,
            raw_payload: serde_json::Value::Null,
            decided_at: None,
        };
        candidate.clamp_confidence();
        assert!((candidate.confidence - 1.0).abs() < f64::EPSILON);
    }
}
