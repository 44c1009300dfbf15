//! Refresh credential encryption at rest
//!
//! AES-256-GCM with a random 96-bit nonce per encryption. The stored form is
//! URL-safe base64 of `nonce || ciphertext || tag`, so the same secret never
//! encrypts to the same string twice and any tampering fails decryption.
//!
//! The key is supplied as URL-safe base64 of 32 bytes (padding optional);
//! [`CredentialVault::generate_key`] produces one.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{
    Engine,
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};
use log::debug;
use thiserror::Error;

/// AES-GCM nonce size (96 bits)
const NONCE_SIZE: usize = 12;

/// AES-256 key size
const KEY_SIZE: usize = 32;

/// Vault errors
#[derive(Debug, Error)]
pub enum VaultError {
    /// The configured key is empty or not 32 bytes of URL-safe base64
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    /// The stored value is malformed or fails authentication
    #[error("invalid encrypted token")]
    InvalidToken,
}

/// Encrypts and decrypts refresh credentials
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Build a vault from a base64 key
    pub fn new(key: &str) -> Result<Self, VaultError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(VaultError::InvalidKey("key is empty".to_string()));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(key.trim_end_matches('='))
            .map_err(|e| VaultError::InvalidKey(format!("not URL-safe base64: {e}")))?;
        if bytes.len() != KEY_SIZE {
            return Err(VaultError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&bytes)
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Generate a fresh random key in the format [`Self::new`] accepts
    pub fn generate_key() -> String {
        URL_SAFE.encode(Aes256Gcm::generate_key(OsRng))
    }

    /// Encrypt a secret
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| VaultError::InvalidToken)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        debug!("Encrypted credential ({} bytes)", ciphertext.len());
        Ok(URL_SAFE.encode(combined))
    }

    /// Decrypt a value produced by [`Self::encrypt`]
    pub fn decrypt(&self, token: &str) -> Result<String, VaultError> {
        let combined = URL_SAFE
            .decode(token.trim())
            .map_err(|_| VaultError::InvalidToken)?;
        if combined.len() <= NONCE_SIZE {
            return Err(VaultError::InvalidToken);
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::InvalidToken)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_is_randomized() {
        let vault = CredentialVault::new(&CredentialVault::generate_key()).unwrap();
        let a = vault.encrypt("1//refresh-token").unwrap();
        let b = vault.encrypt("1//refresh-token").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap(), "1//refresh-token");
        assert_eq!(vault.decrypt(&b).unwrap(), "1//refresh-token");
    }

    #[test]
    fn test_wrong_key_fails() {
        let vault = CredentialVault::new(&CredentialVault::generate_key()).unwrap();
        let other = CredentialVault::new(&CredentialVault::generate_key()).unwrap();
        let token = vault.encrypt("secret").unwrap();
        assert!(matches!(other.decrypt(&token), Err(VaultError::InvalidToken)));
    }

    #[test]
    fn test_tampered_token_fails() {
        let vault = CredentialVault::new(&CredentialVault::generate_key()).unwrap();
        let token = vault.encrypt("secret").unwrap();
        let mut bytes = URL_SAFE.decode(&token).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = URL_SAFE.encode(bytes);
        assert!(matches!(vault.decrypt(&tampered), Err(VaultError::InvalidToken)));
        assert!(matches!(vault.decrypt("not base64!"), Err(VaultError::InvalidToken)));
        assert!(matches!(vault.decrypt(""), Err(VaultError::InvalidToken)));
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(CredentialVault::new(""), Err(VaultError::InvalidKey(_))));
        assert!(matches!(CredentialVault::new("short"), Err(VaultError::InvalidKey(_))));
        assert!(matches!(
            CredentialVault::new("%%%not-base64%%%"),
            Err(VaultError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_unpadded_key_accepted() {
        let key = CredentialVault::generate_key();
        let vault = CredentialVault::new(key.trim_end_matches('=')).unwrap();
        let token = vault.encrypt("x").unwrap();
        assert_eq!(CredentialVault::new(&key).unwrap().decrypt(&token).unwrap(), "x");
    }
}
