//! Credential vault: authenticated encryption for credentials at rest.
//!
//! Tokens are stored on the account row as base64(nonce || ciphertext)
//! using AES-256-GCM. Decryption of a tampered or corrupt blob fails with
//! [`VaultError::Decryption`]; it can never silently yield garbage
//! credentials, because GCM authenticates the ciphertext.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

use mailclerk_oauth::Token;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Errors from vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The configured key is not usable.
    #[error("Invalid vault key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed: wrong key, tampered or corrupt blob.
    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Result type for vault operations.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

/// Encrypts and decrypts credential blobs with a service-wide key.
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Creates a vault from a 32-byte key.
    #[must_use]
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Creates a vault from a base64-encoded 32-byte key, as configured in
    /// the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoding is invalid or the key is not 32
    /// bytes.
    pub fn from_base64_key(encoded: &str) -> VaultResult<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| VaultError::InvalidKey(format!("invalid base64: {e}")))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VaultError::InvalidKey("key must be exactly 32 bytes".to_string()))?;
        Ok(Self::new(&key))
    }

    /// Encrypts a plaintext credential.
    ///
    /// Returns base64(nonce || ciphertext). The nonce is random per call,
    /// so encrypting the same plaintext twice yields different blobs.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> VaultResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::Encryption(format!("AES-GCM encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    /// Decrypts a blob produced by [`Self::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decryption`] for tampered, truncated, or
    /// wrong-key blobs.
    pub fn decrypt(&self, blob: &str) -> VaultResult<String> {
        let combined = BASE64
            .decode(blob)
            .map_err(|e| VaultError::Decryption(format!("invalid base64 encoding: {e}")))?;

        if combined.len() < NONCE_SIZE {
            return Err(VaultError::Decryption(format!(
                "blob too short: {} bytes",
                combined.len()
            )));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext_bytes = self.cipher.decrypt(nonce, ciphertext).map_err(|e| {
            VaultError::Decryption(format!("AES-GCM authentication failed: {e}"))
        })?;

        String::from_utf8(plaintext_bytes)
            .map_err(|e| VaultError::Decryption(format!("plaintext is not valid UTF-8: {e}")))
    }

    /// Encrypts an `OAuth2` token for storage on the account row.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn encrypt_token(&self, token: &Token) -> VaultResult<String> {
        let json = serde_json::to_string(token)
            .map_err(|e| VaultError::Encryption(format!("token serialization failed: {e}")))?;
        self.encrypt(&json)
    }

    /// Decrypts a stored `OAuth2` token.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Decryption`] if the blob is unreadable or does
    /// not contain a token.
    pub fn decrypt_token(&self, blob: &str) -> VaultResult<Token> {
        let json = self.decrypt(blob)?;
        serde_json::from_str(&json)
            .map_err(|e| VaultError::Decryption(format!("token deserialization failed: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_vault() -> CredentialVault {
        CredentialVault::new(&[7u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let vault = test_vault();
        let plaintext = "my_secret_token_payload";

        let blob = vault.encrypt(plaintext).unwrap();
        assert_ne!(blob, plaintext);
        assert_eq!(vault.decrypt(&blob).unwrap(), plaintext);
    }

    #[test]
    fn test_same_plaintext_different_blobs() {
        let vault = test_vault();
        let blob1 = vault.encrypt("same").unwrap();
        let blob2 = vault.encrypt("same").unwrap();

        assert_ne!(blob1, blob2);
        assert_eq!(vault.decrypt(&blob1).unwrap(), "same");
        assert_eq!(vault.decrypt(&blob2).unwrap(), "same");
    }

    #[test]
    fn test_tampered_blob_fails() {
        let vault = test_vault();
        let blob = vault.encrypt("credential").unwrap();

        // Flip one ciphertext byte.
        let mut raw = BASE64.decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(&raw);

        assert!(matches!(
            vault.decrypt(&tampered),
            Err(VaultError::Decryption(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let vault = test_vault();
        let other = CredentialVault::new(&[8u8; 32]);

        let blob = vault.encrypt("credential").unwrap();
        assert!(matches!(
            other.decrypt(&blob),
            Err(VaultError::Decryption(_))
        ));
    }

    #[test]
    fn test_garbage_inputs_fail() {
        let vault = test_vault();

        assert!(vault.decrypt("not_base64!@#$%").is_err());
        assert!(vault.decrypt(&BASE64.encode("short")).is_err());
        assert!(vault.decrypt(&BASE64.encode([0u8; 32])).is_err());
    }

    #[test]
    fn test_base64_key_parsing() {
        let key = BASE64.encode([3u8; 32]);
        let vault = CredentialVault::from_base64_key(&key).unwrap();
        let blob = vault.encrypt("x").unwrap();
        assert_eq!(vault.decrypt(&blob).unwrap(), "x");

        assert!(matches!(
            CredentialVault::from_base64_key("@@@"),
            Err(VaultError::InvalidKey(_))
        ));
        assert!(matches!(
            CredentialVault::from_base64_key(&BASE64.encode([1u8; 16])),
            Err(VaultError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_token_roundtrip() {
        let vault = test_vault();
        let token = Token::new("access123", "Bearer").with_refresh_token("refresh456");

        let blob = vault.encrypt_token(&token).unwrap();
        let restored = vault.decrypt_token(&blob).unwrap();
        assert_eq!(restored.access_token, "access123");
        assert_eq!(restored.refresh_token.as_deref(), Some("refresh456"));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_string(plaintext in ".*") {
            let vault = test_vault();
            let blob = vault.encrypt(&plaintext).unwrap();
            prop_assert_eq!(vault.decrypt(&blob).unwrap(), plaintext);
        }
    }
}
