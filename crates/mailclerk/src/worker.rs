//! Worker and scheduler loops.
//!
//! Workers pull jobs from the shared queue and run one sync at a time;
//! accounts sync fully in parallel across workers with no shared
//! in-process state. The storage-level lease is the only cross-worker
//! exclusion, so a job that loses the lease race just logs and moves on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use mailclerk_core::{
    AccountRepository, Error, SyncJob, SyncOrchestrator, SyncQueue,
};
use mailclerk_provider::MailApi;
use mailclerk_recognition::Recognizer;

/// One worker: pulls jobs until the queue closes.
///
/// A job that exceeds `job_timeout` is abandoned; its lease is reclaimed
/// by the stale-lease window, not by this (possibly wedged) worker.
pub async fn run_worker<M, R>(
    worker_id: usize,
    orchestrator: Arc<SyncOrchestrator<M, R>>,
    jobs: Arc<Mutex<mpsc::Receiver<SyncJob>>>,
    job_timeout: Duration,
) where
    M: MailApi,
    R: Recognizer,
{
    info!(worker_id, "Worker started");

    loop {
        let job = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            info!(worker_id, "Queue closed, worker stopping");
            break;
        };

        let sync = orchestrator.sync_account(job.account_id, &job.task_id);
        match tokio::time::timeout(job_timeout, sync).await {
            Ok(Ok(report)) => {
                info!(
                    worker_id,
                    account = %report.account_id,
                    seen = report.messages_seen,
                    staged = report.staged,
                    "Sync job finished"
                );
            }
            Ok(Err(Error::AlreadySyncing(account_id))) => {
                debug!(worker_id, account = %account_id, "Sync already running, job skipped");
            }
            Ok(Err(e)) => {
                warn!(worker_id, account = %job.account_id, error = %e, "Sync job failed");
            }
            Err(_) => {
                warn!(
                    worker_id,
                    account = %job.account_id,
                    "Sync job timed out; lease will be reclaimed after the stale window"
                );
            }
        }
    }
}

/// Scheduler: periodically enqueues every active account for sync.
pub async fn run_scheduler(accounts: AccountRepository, queue: SyncQueue, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let active = match accounts.list_active().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "Scheduler failed to list accounts");
                continue;
            }
        };

        debug!(count = active.len(), "Scheduling sync round");
        for account in active {
            let Some(account_id) = account.id else {
                continue;
            };
            if let Err(e) = queue.enqueue(account_id).await {
                warn!(error = %e, "Scheduler stopping, queue closed");
                return;
            }
        }
    }
}
