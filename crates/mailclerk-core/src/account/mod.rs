//! Account management: models, storage, credential vault.

pub mod credentials;
mod model;
mod repository;
mod vault;

pub use model::{Account, AccountId, SyncLease, UserId};
pub use repository::AccountRepository;
pub use vault::{CredentialVault, VaultError};
