//! mailclerk - sync worker daemon.
//!
//! Connects linked mailboxes, extracts transaction candidates, and stages
//! them for human approval. Multiple workers run independent accounts in
//! parallel; the per-account lease in storage keeps them exclusive.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod worker;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailclerk_core::{AccountRepository, CredentialVault, Database, SyncOrchestrator, SyncQueue};
use mailclerk_oauth::{OAuthClient, Provider};
use mailclerk_provider::HttpMailClient;
use mailclerk_recognition::HttpRecognizer;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailclerk=debug,mailclerk_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mailclerk worker daemon");

    let config = Config::from_env().context("loading configuration")?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("creating database directory")?;
    }
    let database_path = config.database_path.to_string_lossy().to_string();
    let db = Database::connect(&database_path)
        .await
        .context("opening database")?;

    let vault = CredentialVault::from_base64_key(&config.vault_key).context("loading vault key")?;

    let provider = Provider::google().context("building OAuth provider")?;
    let mut oauth = OAuthClient::new(config.oauth_client_id.clone(), provider);
    if let Some(secret) = &config.oauth_client_secret {
        oauth = oauth.with_client_secret(secret.clone());
    }

    let mail = HttpMailClient::new(&config.provider_url).context("building provider client")?;
    let recognizer =
        HttpRecognizer::new(&config.recognition_url).context("building recognition client")?;

    let orchestrator = Arc::new(SyncOrchestrator::new(&db, vault, oauth, mail, recognizer));

    let (queue, jobs) = SyncQueue::new(64);
    let jobs = Arc::new(Mutex::new(jobs));

    let mut workers = Vec::with_capacity(config.workers);
    for worker_id in 0..config.workers {
        workers.push(tokio::spawn(worker::run_worker(
            worker_id,
            Arc::clone(&orchestrator),
            Arc::clone(&jobs),
            config.job_timeout,
        )));
    }

    let scheduler = tokio::spawn(worker::run_scheduler(
        AccountRepository::new(&db),
        queue.clone(),
        config.sync_interval,
    ));

    info!(workers = config.workers, "mailclerk running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown requested, draining workers");

    // Closing every queue handle ends the workers after the backlog drains.
    scheduler.abort();
    drop(queue);
    for handle in workers {
        let _ = handle.await;
    }

    info!("mailclerk stopped");
    Ok(())
}
