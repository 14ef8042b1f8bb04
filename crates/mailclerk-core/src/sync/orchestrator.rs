//! The per-account sync state machine.
//!
//! One run moves an account through lease acquisition, page-by-page
//! fetch/classify/extract/stage, and lease release. The checkpoint advances
//! only when the whole batch committed; any failure releases the lease with
//! the checkpoint untouched, so the next run re-fetches the batch and the
//! dedup layers absorb the re-delivery.

use std::future::Future;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use mailclerk_oauth::{OAuthClient, Token};
use mailclerk_provider::MailApi;
use mailclerk_recognition::Recognizer;

use crate::account::{Account, AccountId, AccountRepository, CredentialVault, credentials};
use crate::candidate::CandidateRepository;
use crate::classify::FinancialClassifier;
use crate::extract::ContentExtractor;
use crate::message::{Message, MessageRepository, ProcessingStatus};
use crate::store::Database;
use crate::sync::report::SyncReport;
use crate::{Error, Result};

/// Characters of body text kept on the message row for audit.
const SNIPPET_LEN: usize = 280;

/// Tunables for the sync state machine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Age after which a lease is considered abandoned and reclaimable.
    pub stale_lease_after: Duration,
    /// Total attempts for a transient provider failure.
    pub max_attempts: u32,
    /// First backoff delay; doubles per retry unless the provider sent a
    /// `Retry-After` hint.
    pub base_backoff: StdDuration,
    /// Consecutive failures after which the account is flagged for user
    /// attention.
    pub attention_threshold: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_lease_after: Duration::minutes(30),
            max_attempts: 3,
            base_backoff: StdDuration::from_secs(1),
            attention_threshold: 5,
        }
    }
}

/// Drives Fetch → Classify → Extract → Stage for one account at a time.
pub struct SyncOrchestrator<M, R> {
    accounts: AccountRepository,
    messages: MessageRepository,
    candidates: CandidateRepository,
    vault: CredentialVault,
    oauth: OAuthClient,
    mail: M,
    recognizer: R,
    classifier: FinancialClassifier,
    extractor: ContentExtractor,
    config: SyncConfig,
}

impl<M, R> SyncOrchestrator<M, R>
where
    M: MailApi,
    R: Recognizer,
{
    /// Creates an orchestrator over the shared database and external
    /// clients.
    #[must_use]
    pub fn new(
        db: &Database,
        vault: CredentialVault,
        oauth: OAuthClient,
        mail: M,
        recognizer: R,
    ) -> Self {
        Self {
            accounts: AccountRepository::new(db),
            messages: MessageRepository::new(db),
            candidates: CandidateRepository::new(db),
            vault,
            oauth,
            mail,
            recognizer,
            classifier: FinancialClassifier::new(),
            extractor: ContentExtractor::new(),
            config: SyncConfig::default(),
        }
    }

    /// Overrides the sync tunables.
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs one full sync for an account.
    ///
    /// Acquires the exclusive lease, drives the pipeline, and releases the
    /// lease on every exit path; a failed run records the error and leaves
    /// the account resumable, never stuck.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadySyncing`] when another live lease exists,
    /// [`Error::CredentialExpired`] when the stored credential cannot be
    /// refreshed, or the provider/database error that failed the run.
    pub async fn sync_account(&self, account_id: AccountId, task: &str) -> Result<SyncReport> {
        let lease = self
            .accounts
            .acquire_lease(account_id, task, self.config.stale_lease_after)
            .await?;
        info!(account = %account_id, task, "Sync started");

        let mut account = match self.accounts.get(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                // Disconnected between lease and load; nothing to release.
                return Err(Error::AccountNotFound(account_id.to_string()));
            }
            Err(e) => {
                self.accounts.release_failure(&lease, &e.to_string()).await?;
                return Err(e);
            }
        };
        let prior_failures = account.error_count;

        match self.run_sync(&mut account).await {
            Ok(report) => {
                self.accounts
                    .release_success(&lease, report.new_checkpoint)
                    .await?;
                info!(
                    account = %account_id,
                    seen = report.messages_seen,
                    financial = report.financial,
                    staged = report.staged,
                    failed = report.failed_messages,
                    "Sync finished"
                );
                Ok(report)
            }
            Err(e) => {
                self.accounts.release_failure(&lease, &e.to_string()).await?;
                let failures = prior_failures + 1;
                if failures >= self.config.attention_threshold {
                    warn!(
                        account = %account_id,
                        failures,
                        "Account flagged for user attention after repeated sync failures"
                    );
                }
                Err(e)
            }
        }
    }

    /// The fetch → classify → extract → stage pipeline for one account.
    async fn run_sync(&self, account: &mut Account) -> Result<SyncReport> {
        let account_id = account
            .id
            .ok_or_else(|| Error::AccountNotFound("unsaved account".to_string()))?;

        let mut token =
            credentials::get_valid_credential(&self.accounts, &self.vault, &self.oauth, account)
                .await?;

        let mut report = SyncReport::new(account_id);
        let since = account.checkpoint_at;
        let mut max_received: Option<DateTime<Utc>> = None;
        let mut page_token: Option<String> = None;

        loop {
            let page = {
                let page_token = page_token.clone();
                self.call_provider(account, &mut token, |access| {
                    let page_token = page_token.clone();
                    let mail = &self.mail;
                    async move {
                        mail.list_messages(&access, since, page_token.as_deref())
                            .await
                    }
                })
                .await?
            };

            for remote in &page.messages {
                report.messages_seen += 1;
                max_received = Some(max_received.map_or(remote.received_at, |m| {
                    m.max(remote.received_at)
                }));

                let mut message = Message::from_remote(account_id, remote);
                self.messages.upsert(&mut message).await?;
                if message.status == ProcessingStatus::Processed {
                    // Re-delivered and already handled in a previous run.
                    continue;
                }

                let message_id = message
                    .id
                    .ok_or_else(|| Error::Config("message missing id after upsert".to_string()))?;

                if !self.classifier.classify_message(&message).financial {
                    self.messages
                        .set_status(message_id, ProcessingStatus::Processed, None)
                        .await?;
                    continue;
                }
                report.financial += 1;

                match self.process_financial(account, &mut token, &message).await {
                    Ok(staged) => report.staged += staged,
                    Err(e) if is_message_scoped(&e) => {
                        warn!(
                            provider_id = %message.provider_id,
                            error = %e,
                            "Extraction failed for message, skipping"
                        );
                        report.failed_messages += 1;
                        self.messages
                            .set_status(message_id, ProcessingStatus::Failed, None)
                            .await?;
                    }
                    Err(e) => return Err(e),
                }
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        report.new_checkpoint = max_received;
        Ok(report)
    }

    /// Fetches the body of one financial message and stages every
    /// extractable candidate from its text and image attachments.
    async fn process_financial(
        &self,
        account: &mut Account,
        token: &mut Token,
        message: &Message,
    ) -> Result<u32> {
        let message_id = message
            .id
            .ok_or_else(|| Error::Config("message missing id".to_string()))?;

        let body = self
            .call_provider(account, token, |access| {
                let provider_id = message.provider_id.clone();
                let mail = &self.mail;
                async move { mail.fetch_body(&access, &provider_id).await }
            })
            .await?;

        let mut staged = 0;
        for extraction in self.extractor.extract_from_text(&body.text) {
            self.candidates
                .stage(account.user_id, message, &extraction)
                .await?;
            staged += 1;
        }

        for attachment in body.attachments.iter().filter(|a| a.is_image()) {
            let image = self
                .call_provider(account, token, |access| {
                    let provider_id = message.provider_id.clone();
                    let attachment_id = attachment.id.clone();
                    let mail = &self.mail;
                    async move {
                        mail.fetch_attachment(&access, &provider_id, &attachment_id)
                            .await
                    }
                })
                .await?;

            let extractions = self
                .extractor
                .extract_from_attachment(&self.recognizer, image)
                .await?;
            for extraction in extractions {
                self.candidates
                    .stage(account.user_id, message, &extraction)
                    .await?;
                staged += 1;
            }
        }

        let snippet: String = body.text.chars().take(SNIPPET_LEN).collect();
        self.messages
            .set_status(message_id, ProcessingStatus::Processed, Some(&snippet))
            .await?;

        debug!(provider_id = %message.provider_id, staged, "Message processed");
        Ok(staged)
    }

    /// Calls the provider with bounded retries.
    ///
    /// Transient failures back off exponentially, honoring the provider's
    /// `Retry-After` hint when sent. An auth rejection triggers exactly one
    /// forced credential refresh; a second rejection fails the sync with
    /// [`Error::CredentialExpired`], never a retry storm.
    async fn call_provider<T, F, Fut>(
        &self,
        account: &mut Account,
        token: &mut Token,
        op: F,
    ) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = mailclerk_provider::Result<T>>,
    {
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            match op(token.access_token.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.config.max_attempts => {
                    let delay = match &e {
                        mailclerk_provider::Error::RateLimited {
                            retry_after: Some(hint),
                        } => *hint,
                        _ => self.config.base_backoff * 2u32.pow(attempt),
                    };
                    warn!(error = %e, attempt, ?delay, "Provider call failed, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_auth() && !refreshed => {
                    debug!("Access token rejected, forcing credential refresh");
                    refreshed = true;
                    *token = credentials::force_refresh(
                        &self.accounts,
                        &self.vault,
                        &self.oauth,
                        account,
                    )
                    .await?;
                }
                Err(e) if e.is_auth() => {
                    return Err(Error::CredentialExpired(
                        "access token rejected after refresh".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Whether a failure is scoped to one message (logged and skipped) rather
/// than failing the whole sync.
const fn is_message_scoped(error: &Error) -> bool {
    matches!(
        error,
        Error::Extraction(_)
            | Error::Recognition(_)
            | Error::Serde(_)
            | Error::Provider(mailclerk_provider::Error::NotFound(_))
    )
}
