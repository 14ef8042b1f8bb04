//! Error types for the core library.

use thiserror::Error;

use crate::account::AccountId;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Mailbox provider operation failed.
    #[error("Provider error: {0}")]
    Provider(#[from] mailclerk_provider::Error),

    /// `OAuth2` operation failed.
    #[error("OAuth error: {0}")]
    OAuth(#[from] mailclerk_oauth::Error),

    /// Recognition engine operation failed.
    #[error("Recognition error: {0}")]
    Recognition(#[from] mailclerk_recognition::Error),

    /// Credential vault operation failed.
    #[error("Vault error: {0}")]
    Vault(#[from] crate::account::VaultError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Another sync holds a live lease for this account.
    #[error("Sync already running for account {0}")]
    AlreadySyncing(AccountId),

    /// The stored credential can no longer be refreshed; the user must
    /// re-authorize the mailbox connection.
    #[error("Credential expired for account: {0}")]
    CredentialExpired(String),

    /// Account not found or inactive.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Candidate not found.
    #[error("Candidate not found: {0}")]
    CandidateNotFound(i64),

    /// Candidate was already approved or rejected; decisions are one-way.
    #[error("Candidate {0} has already been decided")]
    AlreadyDecided(i64),

    /// Per-message extraction failure; recorded on the message, never fails
    /// the enclosing sync.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this failure should surface to the user as "re-authorize
    /// your mailbox" rather than as a transient sync problem.
    #[must_use]
    pub const fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::CredentialExpired(_) | Self::Vault(_))
    }
}
