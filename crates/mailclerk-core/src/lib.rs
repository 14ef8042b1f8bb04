//! # mailclerk-core
//!
//! Core business logic for the mailclerk ingestion pipeline.
//!
//! This crate provides:
//! - Account management with per-account sync leases
//! - Credential vault (encrypted-at-rest `OAuth2` tokens, refresh on demand)
//! - Message ingestion and dedup by provider-native id
//! - **Financial classification** - sender/subject/body heuristics
//! - **Content extraction** - transaction candidates from text and image
//!   attachments, via an ordered pattern set
//! - **Approval staging** - deduplicated pending-approval records
//! - The sync orchestrator state machine and the service facade exposed to
//!   the surrounding application

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod candidate;
pub mod classify;
mod error;
pub mod extract;
pub mod message;
pub mod service;
mod store;
pub mod sync;

pub use account::credentials;
pub use account::{Account, AccountId, AccountRepository, SyncLease, UserId};
pub use account::{CredentialVault, VaultError};
pub use candidate::{ApprovalStatus, Candidate, CandidateId, CandidateRepository, Decision, Source};
pub use classify::{Classification, FinancialClassifier};
pub use error::{Error, Result};
pub use extract::{ContentExtractor, Extraction};
pub use message::{Message, MessageId, MessageRepository, ProcessingStatus};
pub use service::{ClerkService, SyncState, SyncStatus};
pub use store::Database;
pub use sync::{SyncConfig, SyncJob, SyncJobHandle, SyncOrchestrator, SyncQueue, SyncReport};
