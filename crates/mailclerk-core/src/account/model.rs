//! Account model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for the user owning an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One linked external mailbox connection.
///
/// Sync-health fields (`sync_in_progress`, `sync_lease`, `error_count`,
/// `last_error`) are mutated only through the conditional writes in
/// [`crate::AccountRepository`]; nothing else may touch them.
#[derive(Debug, Clone)]
pub struct Account {
    /// Unique identifier (None for unsaved accounts).
    pub id: Option<AccountId>,
    /// Owning user.
    pub user_id: UserId,
    /// Mailbox address.
    pub email: String,
    /// Whether the account is eligible for sync.
    pub active: bool,
    /// Encrypted `OAuth2` credential (base64 AES-GCM blob).
    pub credential_blob: String,
    /// Cursor marking the last fully-processed point in message history.
    pub checkpoint_at: Option<DateTime<Utc>>,
    /// When the last successful sync finished.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Whether a sync lease is currently held.
    pub sync_in_progress: bool,
    /// Current sync-lease token.
    pub sync_lease: Option<String>,
    /// Identifier of the task holding the lease.
    pub sync_task: Option<String>,
    /// When the current lease was acquired; the staleness clock.
    pub lease_acquired_at: Option<DateTime<Utc>>,
    /// Consecutive failed syncs since the last success.
    pub error_count: u32,
    /// Message of the most recent sync failure.
    pub last_error: Option<String>,
}

impl Account {
    /// Creates an unsaved account for a freshly linked mailbox.
    #[must_use]
    pub fn new(user_id: UserId, email: impl Into<String>, credential_blob: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id,
            email: email.into(),
            active: true,
            credential_blob: credential_blob.into(),
            checkpoint_at: None,
            last_synced_at: None,
            sync_in_progress: false,
            sync_lease: None,
            sync_task: None,
            lease_acquired_at: None,
            error_count: 0,
            last_error: None,
        }
    }

    /// Whether the account has failed often enough to warrant user
    /// attention. It stays eligible for manual retry regardless.
    #[must_use]
    pub const fn needs_attention(&self, threshold: u32) -> bool {
        self.error_count >= threshold
    }
}

/// Proof of an acquired sync lease.
///
/// Only the holder of the matching token can release the lease or advance
/// the checkpoint; a timed-out worker's stale copy is rejected by the
/// conditional writes.
#[derive(Debug, Clone)]
pub struct SyncLease {
    /// Account the lease is held on.
    pub account_id: AccountId,
    /// Lease token.
    pub token: String,
    /// Identifier of the holding task.
    pub task: String,
}
