//! Summary of one sync run, for worker logging and operational checks.

use chrono::{DateTime, Utc};

use crate::account::AccountId;

/// What one sync run saw and did.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Account that was synced.
    pub account_id: AccountId,
    /// Messages listed from the provider.
    pub messages_seen: u32,
    /// Messages classified as financial.
    pub financial: u32,
    /// Candidates ensured in the approval queue (new or deduplicated).
    pub staged: u32,
    /// Messages whose extraction failed and was skipped.
    pub failed_messages: u32,
    /// Checkpoint the run committed, if it saw any messages.
    pub new_checkpoint: Option<DateTime<Utc>>,
}

impl SyncReport {
    /// An empty report for a run that is about to start.
    #[must_use]
    pub const fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            messages_seen: 0,
            financial: 0,
            staged: 0,
            failed_messages: 0,
            new_checkpoint: None,
        }
    }
}
