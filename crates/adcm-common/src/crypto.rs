//! Secret vault
//!
//! Provides AES-256-GCM encryption/decryption for secret-typed config values.
//! Encrypted values carry a fixed recognizable header so that stored
//! ciphertext can be told apart from plaintext without a side channel.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use thiserror::Error;

/// Fixed prefix of every encrypted payload
pub const VAULT_HEADER: &str = "$ANSIBLE_VAULT;1.1;AES256";

const NONCE_LEN: usize = 12;

/// Error types for vault operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Value is not encrypted")]
    MissingHeader,
}

/// Result type for vault operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Encrypts and decrypts secret values
///
/// The encrypted form is:
/// - the [`VAULT_HEADER`] line
/// - base64 of (12 bytes nonce + ciphertext + 16 bytes authentication tag)
pub struct SecretVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVault").finish_non_exhaustive()
    }
}

impl SecretVault {
    /// Create a vault with a 32-byte (256-bit) key
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(key.into());
        Self { cipher }
    }

    /// Create a vault from a base64-encoded key
    pub fn from_base64_key(key: &str) -> CryptoResult<Self> {
        let key_bytes = BASE64
            .decode(key.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let key_array: [u8; 32] = key_bytes.try_into().map_err(|bytes: Vec<u8>| {
            CryptoError::InvalidKey(format!("Key must be 32 bytes, got {}", bytes.len()))
        })?;

        Ok(Self::new(&key_array))
    }

    /// Generate a new random 256-bit key
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        key
    }

    /// Generate a new random key and return it as base64
    pub fn generate_base64_key() -> String {
        BASE64.encode(Self::generate_key())
    }

    /// `true` iff `value` begins with the vault header
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(VAULT_HEADER)
    }

    /// Encrypt plaintext, producing a header-prefixed payload
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{}\n{}", VAULT_HEADER, BASE64.encode(combined)))
    }

    /// Decrypt a header-prefixed payload
    ///
    /// Fails with [`CryptoError::MissingHeader`] when the value is not a
    /// vault payload and with [`CryptoError::DecryptionFailed`] when the
    /// header is present but the payload is invalid.
    pub fn decrypt(&self, value: &str) -> CryptoResult<String> {
        let payload = value
            .strip_prefix(VAULT_HEADER)
            .ok_or(CryptoError::MissingHeader)?;

        let combined = BASE64
            .decode(payload.trim())
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        if combined.len() < NONCE_LEN {
            return Err(CryptoError::DecryptionFailed(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// Encrypt unless the value already carries the vault header
    pub fn encrypt_if_plain(&self, value: &str) -> CryptoResult<String> {
        if Self::is_encrypted(value) {
            Ok(value.to_string())
        } else {
            self.encrypt(value)
        }
    }

    /// Decrypt when the value carries the vault header, otherwise return it as-is
    pub fn decrypt_if_encrypted(&self, value: &str) -> CryptoResult<String> {
        if Self::is_encrypted(value) {
            self.decrypt(value)
        } else {
            Ok(value.to_string())
        }
    }
}
