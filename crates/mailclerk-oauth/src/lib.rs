//! # mailclerk-oauth
//!
//! `OAuth2` authentication library for mailbox provider access.
//!
//! ## Features
//!
//! - **Authorization Code Flow** with PKCE for linking a user's mailbox
//! - **Token management**: expiration checking, automatic refresh
//! - **Provider configurations**: pre-configured for Google, configurable
//!   for any `OAuth2`-compliant mailbox provider
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailclerk_oauth::{AuthorizationCodeFlow, OAuthClient, Provider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Provider::google()?;
//!     let client = OAuthClient::new("your_client_id", provider)
//!         .with_client_secret("your_secret")
//!         .with_redirect_uri("http://localhost:8080");
//!
//!     let flow = AuthorizationCodeFlow::new(client).with_pkce();
//!     let auth_url = flow.authorization_url(None, Some("random_state"))?;
//!     println!("Visit: {auth_url}");
//!
//!     // After the user authorizes, exchange the code for a token
//!     let token = flow.exchange_code("code_from_redirect", None).await?;
//!     println!("Access token: {}", token.access_token);
//!     Ok(())
//! }
//! ```
//!
//! ### Token Refresh
//!
//! ```ignore
//! if token.is_expired() {
//!     let new_token = client.refresh_token(&token).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use error::{Error, Result};
pub use flow::{AuthorizationCodeFlow, OAuthClient, PkceChallenge};
pub use provider::Provider;
pub use token::Token;
