//! # mailclerk-provider
//!
//! HTTP client for the mailbox provider's message API.
//!
//! The provider exposes a paginated message listing filtered by date, a
//! per-message body endpoint (MIME text plus attachment references), and a
//! raw attachment endpoint. This crate wraps those behind the [`MailApi`]
//! trait so the sync pipeline can run against a mock in tests.
//!
//! Rate-limit responses surface as [`Error::RateLimited`] with the server's
//! `Retry-After` hint, distinct from [`Error::Unavailable`], so callers can
//! back off specifically rather than treating every failure the same way.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod api;
mod error;
mod http;
mod types;

pub use api::MailApi;
pub use error::{Error, Result};
pub use http::HttpMailClient;
pub use types::{AttachmentRef, MessageBody, MessagePage, RemoteMessage};
