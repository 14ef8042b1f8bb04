//! Account storage repository.
//!
//! All sync-state transitions are compare-and-set style conditional writes:
//! the expected current state is part of the `WHERE` clause and the caller
//! checks `rows_affected`. That makes the lease protocol correct across
//! independent worker processes without any in-process locking.

use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{Account, AccountId, SyncLease, UserId};
use crate::store::Database;
use crate::{Error, Result};

/// Repository for account storage and sync-state transitions.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Creates a repository over the shared database.
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Insert a freshly linked account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails, including when the
    /// (user, email) pair is already linked.
    pub async fn insert(&self, account: &mut Account) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO accounts (user_id, email, active, credential_blob)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(account.user_id.0)
        .bind(&account.email)
        .bind(account.active)
        .bind(&account.credential_blob)
        .execute(&self.pool)
        .await?;

        let id = AccountId::new(result.last_insert_rowid());
        account.id = Some(id);
        debug!(account = %id, "Linked account inserted");
        Ok(())
    }

    /// Get account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, email, active, credential_blob,
                   checkpoint_at, last_synced_at, sync_in_progress,
                   sync_lease, sync_task, lease_acquired_at,
                   error_count, last_error
            FROM accounts
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// All active accounts, for the sync scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, email, active, credential_blob,
                   checkpoint_at, last_synced_at, sync_in_progress,
                   sync_lease, sync_task, lease_acquired_at,
                   error_count, last_error
            FROM accounts
            WHERE active = 1
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Disconnect an account: deletes the row and, via cascade, its
    /// messages and their candidates. Any in-flight lease dies with the
    /// row, since every lease-conditioned write matches zero rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, id: AccountId) -> Result<()> {
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        debug!(account = %id, "Account disconnected");
        Ok(())
    }

    /// Atomically claim the sync slot for an account.
    ///
    /// Succeeds when no lease is held, or when the held lease is older than
    /// `stale_after` (the holder is presumed dead). The check and the claim
    /// are one conditional UPDATE, so concurrent callers across processes
    /// get exactly one winner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadySyncing`] when a live lease exists, or
    /// [`Error::AccountNotFound`] for a missing or inactive account.
    pub async fn acquire_lease(
        &self,
        id: AccountId,
        task: &str,
        stale_after: Duration,
    ) -> Result<SyncLease> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let stale_cutoff = now - stale_after;

        let result = sqlx::query(
            r"
            UPDATE accounts
            SET sync_in_progress = 1,
                sync_lease = ?,
                sync_task = ?,
                lease_acquired_at = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND active = 1
              AND (sync_in_progress = 0
                   OR sync_lease IS NULL
                   OR lease_acquired_at < ?)
            ",
        )
        .bind(&token)
        .bind(task)
        .bind(now.to_rfc3339())
        .bind(id.0)
        .bind(stale_cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(account = %id, task, "Sync lease acquired");
            return Ok(SyncLease {
                account_id: id,
                token,
                task: task.to_string(),
            });
        }

        // Zero rows: either the account is gone/inactive or somebody else
        // holds a live lease.
        match self.get(id).await? {
            Some(account) if account.active => Err(Error::AlreadySyncing(id)),
            _ => Err(Error::AccountNotFound(id.to_string())),
        }
    }

    /// Release a lease after a successful sync.
    ///
    /// Resets the error counter, records the sync time, and advances the
    /// checkpoint when one is supplied. Conditional on the lease token:
    /// returns `false` (and changes nothing) if the lease was reclaimed
    /// from under the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn release_success(
        &self,
        lease: &SyncLease,
        checkpoint: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET sync_in_progress = 0,
                sync_lease = NULL,
                sync_task = NULL,
                lease_acquired_at = NULL,
                last_synced_at = ?,
                checkpoint_at = COALESCE(?, checkpoint_at),
                error_count = 0,
                last_error = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND sync_lease = ?
            ",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(checkpoint.map(|ts| ts.to_rfc3339()))
        .bind(lease.account_id.0)
        .bind(&lease.token)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected() == 1;
        if released {
            debug!(account = %lease.account_id, "Sync lease released after success");
        } else {
            warn!(
                account = %lease.account_id,
                "Stale lease release ignored; a newer sync holds the slot"
            );
        }
        Ok(released)
    }

    /// Release a lease after a failed sync.
    ///
    /// Increments the consecutive-error count and records the message; the
    /// checkpoint stays where it was so the next sync re-fetches the batch.
    /// Conditional on the lease token, like [`Self::release_success`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn release_failure(&self, lease: &SyncLease, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET sync_in_progress = 0,
                sync_lease = NULL,
                sync_task = NULL,
                lease_acquired_at = NULL,
                error_count = error_count + 1,
                last_error = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND sync_lease = ?
            ",
        )
        .bind(error)
        .bind(lease.account_id.0)
        .bind(&lease.token)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected() == 1;
        if released {
            debug!(account = %lease.account_id, error, "Sync lease released after failure");
        } else {
            warn!(
                account = %lease.account_id,
                "Stale lease failure-release ignored; a newer sync holds the slot"
            );
        }
        Ok(released)
    }

    /// Replace the credential blob, conditional on the expected current
    /// blob. Concurrent refreshes collapse to one winner; the loser sees
    /// `false` and reloads the winner's blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn update_credential_blob(
        &self,
        id: AccountId,
        new_blob: &str,
        expected_blob: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET credential_blob = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND credential_blob = ?
            ",
        )
        .bind(new_blob)
        .bind(id.0)
        .bind(expected_blob)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Convert a database row to an Account.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Account {
    Account {
        id: Some(AccountId::new(row.get("id"))),
        user_id: UserId::new(row.get("user_id")),
        email: row.get("email"),
        active: row.get::<i64, _>("active") != 0,
        credential_blob: row.get("credential_blob"),
        checkpoint_at: parse_timestamp(row.get("checkpoint_at")),
        last_synced_at: parse_timestamp(row.get("last_synced_at")),
        sync_in_progress: row.get::<i64, _>("sync_in_progress") != 0,
        sync_lease: row.get("sync_lease"),
        sync_task: row.get("sync_task"),
        lease_acquired_at: parse_timestamp(row.get("lease_acquired_at")),
        error_count: row.get::<i64, _>("error_count") as u32,
        last_error: row.get("last_error"),
    }
}

/// Parse an RFC3339 timestamp column, treating unparseable values as unset.
fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn repo_with_account() -> (AccountRepository, AccountId) {
        let db = Database::in_memory().await.unwrap();
        let repo = AccountRepository::new(&db);
        let mut account = Account::new(UserId::new(1), "user@example.com", "blob-v1");
        repo.insert(&mut account).await.unwrap();
        (repo, account.id.unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (repo, id) = repo_with_account().await;

        let account = repo.get(id).await.unwrap().unwrap();
        assert_eq!(account.email, "user@example.com");
        assert!(account.active);
        assert!(!account.sync_in_progress);
        assert_eq!(account.error_count, 0);
    }

    #[tokio::test]
    async fn test_acquire_lease_sets_state() {
        let (repo, id) = repo_with_account().await;

        let lease = repo
            .acquire_lease(id, "worker-1", Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(lease.account_id, id);

        let account = repo.get(id).await.unwrap().unwrap();
        assert!(account.sync_in_progress);
        assert_eq!(account.sync_lease.as_deref(), Some(lease.token.as_str()));
        assert_eq!(account.sync_task.as_deref(), Some("worker-1"));
        assert!(account.lease_acquired_at.is_some());
    }

    #[tokio::test]
    async fn test_second_acquire_fails_while_lease_live() {
        let (repo, id) = repo_with_account().await;

        repo.acquire_lease(id, "worker-1", Duration::minutes(30))
            .await
            .unwrap();

        let err = repo
            .acquire_lease(id, "worker-2", Duration::minutes(30))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadySyncing(a) if a == id));
    }

    #[tokio::test]
    async fn test_concurrent_acquire_yields_one_winner() {
        let (repo, id) = repo_with_account().await;

        let (a, b) = tokio::join!(
            repo.acquire_lease(id, "worker-1", Duration::minutes(30)),
            repo.acquire_lease(id, "worker-2", Duration::minutes(30)),
        );

        let successes = usize::from(a.is_ok()) + usize::from(b.is_ok());
        assert_eq!(successes, 1);
        let failure = if a.is_err() { a } else { b };
        assert!(matches!(failure, Err(Error::AlreadySyncing(_))));
    }

    #[tokio::test]
    async fn test_stale_lease_is_reclaimable() {
        let (repo, id) = repo_with_account().await;

        let old = repo
            .acquire_lease(id, "worker-dead", Duration::minutes(30))
            .await
            .unwrap();

        // Age the lease past the timeout, as if the holder crashed.
        let stale_time = (Utc::now() - Duration::minutes(45)).to_rfc3339();
        sqlx::query("UPDATE accounts SET lease_acquired_at = ? WHERE id = ?")
            .bind(stale_time)
            .bind(id.0)
            .execute(&repo.pool)
            .await
            .unwrap();

        let new = repo
            .acquire_lease(id, "worker-new", Duration::minutes(30))
            .await
            .unwrap();
        assert_ne!(new.token, old.token);

        // The dead worker's release must not clobber the new lease.
        assert!(!repo.release_failure(&old, "timed out").await.unwrap());
        let account = repo.get(id).await.unwrap().unwrap();
        assert_eq!(account.sync_lease.as_deref(), Some(new.token.as_str()));
    }

    #[tokio::test]
    async fn test_release_success_resets_errors_and_advances_checkpoint() {
        let (repo, id) = repo_with_account().await;

        // Seed failure history.
        for _ in 0..3 {
            let lease = repo
                .acquire_lease(id, "worker-1", Duration::minutes(30))
                .await
                .unwrap();
            repo.release_failure(&lease, "provider unavailable")
                .await
                .unwrap();
        }
        let account = repo.get(id).await.unwrap().unwrap();
        assert_eq!(account.error_count, 3);
        assert!(account.last_error.is_some());
        assert!(account.checkpoint_at.is_none());

        let lease = repo
            .acquire_lease(id, "worker-1", Duration::minutes(30))
            .await
            .unwrap();
        let checkpoint = Utc::now();
        assert!(
            repo.release_success(&lease, Some(checkpoint))
                .await
                .unwrap()
        );

        let account = repo.get(id).await.unwrap().unwrap();
        assert_eq!(account.error_count, 0);
        assert!(account.last_error.is_none());
        assert!(!account.sync_in_progress);
        assert!(account.sync_lease.is_none());
        assert!(account.last_synced_at.is_some());
        assert_eq!(
            account.checkpoint_at.unwrap().timestamp(),
            checkpoint.timestamp()
        );
    }

    #[tokio::test]
    async fn test_release_failure_preserves_checkpoint() {
        let (repo, id) = repo_with_account().await;

        // Establish a committed checkpoint.
        let lease = repo
            .acquire_lease(id, "worker-1", Duration::minutes(30))
            .await
            .unwrap();
        let checkpoint = Utc::now() - Duration::hours(1);
        repo.release_success(&lease, Some(checkpoint)).await.unwrap();

        // A failed sync must not move it.
        let lease = repo
            .acquire_lease(id, "worker-1", Duration::minutes(30))
            .await
            .unwrap();
        repo.release_failure(&lease, "rate limited").await.unwrap();

        let account = repo.get(id).await.unwrap().unwrap();
        assert_eq!(
            account.checkpoint_at.unwrap().timestamp(),
            checkpoint.timestamp()
        );
        assert_eq!(account.error_count, 1);
        assert_eq!(account.last_error.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_success_without_new_checkpoint_keeps_old() {
        let (repo, id) = repo_with_account().await;

        let lease = repo
            .acquire_lease(id, "worker-1", Duration::minutes(30))
            .await
            .unwrap();
        let checkpoint = Utc::now() - Duration::hours(2);
        repo.release_success(&lease, Some(checkpoint)).await.unwrap();

        // Empty batch: sync succeeded but saw nothing new.
        let lease = repo
            .acquire_lease(id, "worker-1", Duration::minutes(30))
            .await
            .unwrap();
        repo.release_success(&lease, None).await.unwrap();

        let account = repo.get(id).await.unwrap().unwrap();
        assert_eq!(
            account.checkpoint_at.unwrap().timestamp(),
            checkpoint.timestamp()
        );
    }

    #[tokio::test]
    async fn test_inactive_account_not_leasable() {
        let (repo, id) = repo_with_account().await;

        sqlx::query("UPDATE accounts SET active = 0 WHERE id = ?")
            .bind(id.0)
            .execute(&repo.pool)
            .await
            .unwrap();

        let err = repo
            .acquire_lease(id, "worker-1", Duration::minutes(30))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_credential_blob_cas() {
        let (repo, id) = repo_with_account().await;

        assert!(
            repo.update_credential_blob(id, "blob-v2", "blob-v1")
                .await
                .unwrap()
        );
        // Second writer with the outdated expectation loses.
        assert!(
            !repo
                .update_credential_blob(id, "blob-v3", "blob-v1")
                .await
                .unwrap()
        );

        let account = repo.get(id).await.unwrap().unwrap();
        assert_eq!(account.credential_blob, "blob-v2");
    }

    #[tokio::test]
    async fn test_delete_removes_account() {
        let (repo, id) = repo_with_account().await;

        repo.delete(id).await.unwrap();
        assert!(repo.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_excludes_inactive() {
        let db = Database::in_memory().await.unwrap();
        let repo = AccountRepository::new(&db);

        let mut a = Account::new(UserId::new(1), "a@example.com", "blob");
        repo.insert(&mut a).await.unwrap();
        let mut b = Account::new(UserId::new(1), "b@example.com", "blob");
        b.active = false;
        repo.insert(&mut b).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].email, "a@example.com");
    }
}
