//! The facade exposed to the surrounding application.
//!
//! Everything the HTTP surface and admin tooling need from this core goes
//! through [`ClerkService`]: linking and disconnecting mailboxes,
//! triggering syncs, reading sync health, and working the approval queue.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use mailclerk_oauth::{AuthorizationCodeFlow, OAuthClient};

use crate::account::{Account, AccountId, AccountRepository, CredentialVault, UserId};
use crate::candidate::{Candidate, CandidateId, CandidateRepository, Decision};
use crate::store::Database;
use crate::sync::{SyncJobHandle, SyncQueue};
use crate::{Error, Result};

/// Coarse sync state derived from the account's lease fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync running.
    Idle,
    /// A lease is held and a worker is (or was) processing.
    Syncing,
}

/// Operational sync health of one account.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Whether a sync is currently running.
    pub state: SyncState,
    /// Task holding the lease, when syncing.
    pub task: Option<String>,
    /// Last successful sync time.
    pub last_success: Option<DateTime<Utc>>,
    /// Committed message-history cursor.
    pub checkpoint: Option<DateTime<Utc>>,
    /// Consecutive failures since the last success.
    pub error_count: u32,
    /// Most recent failure message.
    pub last_error: Option<String>,
    /// Whether repeated failures crossed the attention threshold.
    pub needs_attention: bool,
}

/// Service facade over the core repositories and the sync queue.
pub struct ClerkService {
    accounts: AccountRepository,
    candidates: CandidateRepository,
    vault: CredentialVault,
    oauth: OAuthClient,
    queue: SyncQueue,
    attention_threshold: u32,
}

impl ClerkService {
    /// Creates the service over the shared database and external clients.
    #[must_use]
    pub fn new(
        db: &Database,
        vault: CredentialVault,
        oauth: OAuthClient,
        queue: SyncQueue,
        attention_threshold: u32,
    ) -> Self {
        Self {
            accounts: AccountRepository::new(db),
            candidates: CandidateRepository::new(db),
            vault,
            oauth,
            queue,
            attention_threshold,
        }
    }

    /// Links a mailbox: exchanges the authorization code, encrypts the
    /// token, and creates the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the code exchange, encryption, or insert fails.
    pub async fn link_account(
        &self,
        user_id: UserId,
        email: &str,
        oauth_code: &str,
    ) -> Result<Account> {
        let flow = AuthorizationCodeFlow::new(self.oauth.clone());
        let token = flow.exchange_code(oauth_code, None).await?;

        let blob = self.vault.encrypt_token(&token)?;
        let mut account = Account::new(user_id, email, blob);
        self.accounts.insert(&mut account).await?;

        info!(user = %user_id, email, "Mailbox linked");
        Ok(account)
    }

    /// Disconnects an account: removes it and, via cascade, its messages
    /// and candidates. Any in-flight lease is invalidated by the delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn disconnect_account(&self, account_id: AccountId) -> Result<()> {
        self.accounts.delete(account_id).await?;
        info!(account = %account_id, "Mailbox disconnected");
        Ok(())
    }

    /// Enqueues a sync job for an account.
    ///
    /// The job handle's task id can be matched against
    /// [`SyncStatus::task`] to follow the job.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist or the queue is
    /// closed.
    pub async fn trigger_sync(&self, account_id: AccountId) -> Result<SyncJobHandle> {
        if self.accounts.get(account_id).await?.is_none() {
            return Err(Error::AccountNotFound(account_id.to_string()));
        }
        self.queue.enqueue(account_id).await
    }

    /// Reads the sync health of an account.
    ///
    /// Always reflects stored truth: a crashed sync shows `Syncing` only
    /// until the stale-lease window passes, after which the next
    /// `begin_sync` reclaims the slot without operator help.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not exist.
    pub async fn sync_status(&self, account_id: AccountId) -> Result<SyncStatus> {
        let account = self
            .accounts
            .get(account_id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        Ok(SyncStatus {
            state: if account.sync_in_progress {
                SyncState::Syncing
            } else {
                SyncState::Idle
            },
            task: account.sync_task.clone(),
            last_success: account.last_synced_at,
            checkpoint: account.checkpoint_at,
            error_count: account.error_count,
            last_error: account.last_error.clone(),
            needs_attention: account.needs_attention(self.attention_threshold),
        })
    }

    /// All candidates awaiting the user's decision, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_pending_candidates(&self, user_id: UserId) -> Result<Vec<Candidate>> {
        self.candidates.list_pending(user_id).await
    }

    /// Applies a human decision to a pending candidate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDecided`] for a second decision or
    /// [`Error::CandidateNotFound`] for an unknown id.
    pub async fn decide_candidate(
        &self,
        candidate_id: CandidateId,
        decision: Decision,
    ) -> Result<Candidate> {
        self.candidates.decide(candidate_id, decision).await
    }

    /// Stages a manually entered transaction for approval.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn stage_manual_candidate(
        &self,
        user_id: UserId,
        amount: f64,
        currency: &str,
        merchant: &str,
        txn_date: NaiveDate,
    ) -> Result<Candidate> {
        self.candidates
            .stage_manual(user_id, amount, currency, merchant, txn_date)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mailclerk_oauth::{Provider, Token};

    fn vault() -> CredentialVault {
        CredentialVault::new(&[2u8; 32])
    }

    fn oauth() -> OAuthClient {
        OAuthClient::new("client", Provider::google().unwrap())
    }

    async fn service() -> (ClerkService, Database, tokio::sync::mpsc::Receiver<crate::SyncJob>) {
        let db = Database::in_memory().await.unwrap();
        let (queue, rx) = SyncQueue::new(8);
        let service = ClerkService::new(&db, vault(), oauth(), queue, 5);
        (service, db, rx)
    }

    async fn seeded_account(db: &Database) -> AccountId {
        let accounts = AccountRepository::new(db);
        let token = Token::new("access", "Bearer")
            .with_expires_at(Utc::now() + Duration::hours(1))
            .with_refresh_token("refresh");
        let blob = vault().encrypt_token(&token).unwrap();
        let mut account = Account::new(UserId::new(1), "user@example.com", blob);
        accounts.insert(&mut account).await.unwrap();
        account.id.unwrap()
    }

    #[tokio::test]
    async fn test_trigger_sync_enqueues_job() {
        let (service, db, mut rx) = service().await;
        let account_id = seeded_account(&db).await;

        let handle = service.trigger_sync(account_id).await.unwrap();
        let job = rx.recv().await.unwrap();
        assert_eq!(job.account_id, account_id);
        assert_eq!(job.task_id, handle.task_id);
    }

    #[tokio::test]
    async fn test_trigger_sync_unknown_account() {
        let (service, _db, _rx) = service().await;
        let err = service.trigger_sync(AccountId::new(404)).await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_sync_status_reflects_lease() {
        let (service, db, _rx) = service().await;
        let account_id = seeded_account(&db).await;

        let idle = service.sync_status(account_id).await.unwrap();
        assert_eq!(idle.state, SyncState::Idle);
        assert_eq!(idle.error_count, 0);
        assert!(!idle.needs_attention);

        let accounts = AccountRepository::new(&db);
        let lease = accounts
            .acquire_lease(account_id, "task-9", Duration::minutes(30))
            .await
            .unwrap();

        let running = service.sync_status(account_id).await.unwrap();
        assert_eq!(running.state, SyncState::Syncing);
        assert_eq!(running.task.as_deref(), Some("task-9"));

        accounts.release_failure(&lease, "boom").await.unwrap();
        let failed = service.sync_status(account_id).await.unwrap();
        assert_eq!(failed.state, SyncState::Idle);
        assert_eq!(failed.error_count, 1);
        assert_eq!(failed.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_manual_candidate_and_decision_flow() {
        let (service, _db, _rx) = service().await;

        let candidate = service
            .stage_manual_candidate(
                UserId::new(1),
                420.0,
                "NPR",
                "Corner Shop",
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            )
            .await
            .unwrap();

        let pending = service.list_pending_candidates(UserId::new(1)).await.unwrap();
        assert_eq!(pending.len(), 1);

        let decided = service
            .decide_candidate(candidate.id.unwrap(), Decision::Approve)
            .await
            .unwrap();
        assert!(!decided.is_pending());

        assert!(
            service
                .list_pending_candidates(UserId::new(1))
                .await
                .unwrap()
                .is_empty()
        );

        let err = service
            .decide_candidate(candidate.id.unwrap(), Decision::Reject)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyDecided(_)));
    }

    #[tokio::test]
    async fn test_disconnect_cascades() {
        let (service, db, _rx) = service().await;
        let account_id = seeded_account(&db).await;

        service.disconnect_account(account_id).await.unwrap();
        let err = service.sync_status(account_id).await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }
}
