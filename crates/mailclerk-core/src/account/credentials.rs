//! Credential lifecycle: decrypt, refresh on demand, re-encrypt.
//!
//! Refresh is guarded by a compare-and-set on the stored blob, the same
//! conditional-update technique used for sync leases: when two workers race
//! to refresh the same credential, one wins the write and the other adopts
//! the winner's token instead of issuing a second refresh.

use tracing::{debug, warn};

use mailclerk_oauth::{OAuthClient, Token};

use super::model::Account;
use super::repository::AccountRepository;
use super::vault::CredentialVault;
use crate::{Error, Result};

/// Returns a valid (non-expired) access token for the account,
/// refreshing and re-persisting it when necessary.
///
/// Updates `account.credential_blob` in place when a refresh happened, so
/// later compare-and-set calls in the same sync see the current value.
///
/// # Errors
///
/// Returns [`Error::Vault`] for an unreadable blob and
/// [`Error::CredentialExpired`] when the provider rejects the refresh;
/// both require the user to re-authorize.
pub async fn get_valid_credential(
    repo: &AccountRepository,
    vault: &CredentialVault,
    oauth: &OAuthClient,
    account: &mut Account,
) -> Result<Token> {
    let token = vault.decrypt_token(&account.credential_blob)?;

    if token.is_valid() {
        return Ok(token);
    }

    debug!(user = %account.user_id, "Stored access token expired, refreshing");
    refresh_and_store(repo, vault, oauth, account, &token).await
}

/// Forces a refresh regardless of the stored expiry, used when the
/// provider rejects a token that still looked valid locally.
///
/// # Errors
///
/// Same as [`get_valid_credential`].
pub async fn force_refresh(
    repo: &AccountRepository,
    vault: &CredentialVault,
    oauth: &OAuthClient,
    account: &mut Account,
) -> Result<Token> {
    let token = vault.decrypt_token(&account.credential_blob)?;
    refresh_and_store(repo, vault, oauth, account, &token).await
}

async fn refresh_and_store(
    repo: &AccountRepository,
    vault: &CredentialVault,
    oauth: &OAuthClient,
    account: &mut Account,
    token: &Token,
) -> Result<Token> {
    let account_id = account
        .id
        .ok_or_else(|| Error::AccountNotFound("unsaved account".to_string()))?;

    let refreshed = match oauth.refresh_token(token).await {
        Ok(refreshed) => refreshed,
        Err(e) if e.requires_reauthorization() => {
            warn!(account = %account_id, "Credential refresh rejected, re-authorization required");
            return Err(Error::CredentialExpired(e.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let new_blob = vault.encrypt_token(&refreshed)?;
    let won = repo
        .update_credential_blob(account_id, &new_blob, &account.credential_blob)
        .await?;

    if won {
        account.credential_blob = new_blob;
        debug!(account = %account_id, "Refreshed credential persisted");
        return Ok(refreshed);
    }

    // Another worker refreshed concurrently; adopt its token.
    debug!(account = %account_id, "Concurrent refresh won the race, adopting its credential");
    let current = repo
        .get(account_id)
        .await?
        .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;
    account.credential_blob = current.credential_blob.clone();
    Ok(vault.decrypt_token(&current.credential_blob)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::UserId;
    use crate::store::Database;
    use chrono::{Duration, Utc};
    use mailclerk_oauth::Provider;

    fn vault() -> CredentialVault {
        CredentialVault::new(&[9u8; 32])
    }

    fn oauth() -> OAuthClient {
        OAuthClient::new("client", Provider::google().unwrap())
    }

    async fn account_with_token(token: &Token) -> (AccountRepository, Account) {
        let db = Database::in_memory().await.unwrap();
        let repo = AccountRepository::new(&db);
        let blob = vault().encrypt_token(token).unwrap();
        let mut account = Account::new(UserId::new(1), "user@example.com", blob);
        repo.insert(&mut account).await.unwrap();
        (repo, account)
    }

    #[tokio::test]
    async fn test_valid_token_returned_without_refresh() {
        let token = Token::new("fresh", "Bearer")
            .with_expires_at(Utc::now() + Duration::hours(1))
            .with_refresh_token("r");
        let (repo, mut account) = account_with_token(&token).await;

        let got = get_valid_credential(&repo, &vault(), &oauth(), &mut account)
            .await
            .unwrap();
        assert_eq!(got.access_token, "fresh");
    }

    #[tokio::test]
    async fn test_token_without_expiry_is_trusted() {
        let token = Token::new("no-expiry", "Bearer");
        let (repo, mut account) = account_with_token(&token).await;

        let got = get_valid_credential(&repo, &vault(), &oauth(), &mut account)
            .await
            .unwrap();
        assert_eq!(got.access_token, "no-expiry");
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_decryption_error() {
        let db = Database::in_memory().await.unwrap();
        let repo = AccountRepository::new(&db);
        let mut account = Account::new(UserId::new(1), "user@example.com", "garbage-blob");
        repo.insert(&mut account).await.unwrap();

        let err = get_valid_credential(&repo, &vault(), &oauth(), &mut account)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Vault(_)));
        assert!(err.requires_reauthorization());
    }

    #[tokio::test]
    async fn test_unsaved_account_rejected_on_refresh_path() {
        let expired = Token::new("old", "Bearer")
            .with_expires_at(Utc::now() - Duration::hours(1))
            .with_refresh_token("r");
        let db = Database::in_memory().await.unwrap();
        let repo = AccountRepository::new(&db);
        let blob = vault().encrypt_token(&expired).unwrap();
        let mut account = Account::new(UserId::new(1), "user@example.com", blob);
        account.id = None;

        let err = get_valid_credential(&repo, &vault(), &oauth(), &mut account)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_lost_refresh_race_adopts_stored_token() {
        // Another worker refreshed first: the stored blob no longer matches
        // the one we read, so our CAS loses and we use the stored token.
        let stale = Token::new("stale", "Bearer")
            .with_expires_at(Utc::now() + Duration::hours(1))
            .with_refresh_token("r");
        let (repo, account) = account_with_token(&stale).await;
        let id = account.id.unwrap();

        let winner = Token::new("winner", "Bearer")
            .with_expires_at(Utc::now() + Duration::hours(1))
            .with_refresh_token("r");
        let winner_blob = vault().encrypt_token(&winner).unwrap();
        assert!(
            repo.update_credential_blob(id, &winner_blob, &account.credential_blob)
                .await
                .unwrap()
        );

        // Losing CAS with the stale expectation leaves the winner in place.
        let own_blob = vault().encrypt_token(&stale).unwrap();
        assert!(
            !repo
                .update_credential_blob(id, &own_blob, &account.credential_blob)
                .await
                .unwrap()
        );
        let stored = repo.get(id).await.unwrap().unwrap();
        let adopted = vault().decrypt_token(&stored.credential_blob).unwrap();
        assert_eq!(adopted.access_token, "winner");
    }
}
