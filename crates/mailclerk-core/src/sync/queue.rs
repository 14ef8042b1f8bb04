//! The sync job queue feeding worker tasks.
//!
//! Workers are independent consumers; the queue carries no account state.
//! The real mutual exclusion is the storage-level lease, so a job that
//! races another sync for the same account simply loses the lease and
//! reports `AlreadySyncing`.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::account::AccountId;
use crate::{Error, Result};

/// One unit of sync work.
#[derive(Debug, Clone)]
pub struct SyncJob {
    /// Account to sync.
    pub account_id: AccountId,
    /// Identifier of this job, recorded on the lease for diagnostics.
    pub task_id: String,
}

impl SyncJob {
    /// Creates a job with a fresh task identifier.
    #[must_use]
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            task_id: format!("task-{}", Uuid::new_v4()),
        }
    }
}

/// Handle returned to the caller that triggered a sync.
#[derive(Debug, Clone)]
pub struct SyncJobHandle {
    /// Account the job targets.
    pub account_id: AccountId,
    /// Task identifier, matchable against the account's `sync_task` field.
    pub task_id: String,
}

/// Producer half of the sync job queue.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<SyncJob>,
}

impl SyncQueue {
    /// Creates the queue, returning the producer and the consumer ends.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SyncJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueues a sync job for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker side of the queue has shut down.
    pub async fn enqueue(&self, account_id: AccountId) -> Result<SyncJobHandle> {
        let job = SyncJob::new(account_id);
        let handle = SyncJobHandle {
            account_id,
            task_id: job.task_id.clone(),
        };

        self.tx
            .send(job)
            .await
            .map_err(|_| Error::Config("sync queue is closed".to_string()))?;
        Ok(handle)
    }
}
