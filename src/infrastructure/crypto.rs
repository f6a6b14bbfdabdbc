use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("Invalid key length")]
    InvalidKeyLength,
}

/// AES-256-GCM cipher for streaming account passwords.
///
/// Ciphertexts are `nonce || sealed bytes`.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    pub fn new(key_base64: &str) -> Result<Self, EncryptionError> {
        let key_bytes = BASE64
            .decode(key_base64.trim())
            .map_err(|_| EncryptionError::InvalidKeyLength)?;

        let key: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength)?;

        warn_on_weak_key(&key);

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_LEN + sealed.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&sealed);
        Ok(result)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<String, EncryptionError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(EncryptionError::DecryptionFailed(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))
    }
}

fn warn_on_weak_key(key: &[u8; 32]) {
    if key.iter().all(|&b| b == key[0]) {
        warn!("CRITICAL: credential encryption key has uniform bytes");
        return;
    }

    let unique: HashSet<u8> = key.iter().copied().collect();
    let ratio = unique.len() as f32 / key.len() as f32;
    if ratio < 0.5 {
        warn!(
            unique_pct = ratio * 100.0,
            "Credential encryption key has low entropy, consider rotating it"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXoxMjM0NTY=";

    #[test]
    fn encrypt_then_decrypt_returns_password() {
        let cipher = CredentialCipher::new(KEY).unwrap();

        let sealed = cipher.encrypt("hunter2!").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"hunter2!");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "hunter2!");
    }

    #[test]
    fn same_password_encrypts_differently() {
        let cipher = CredentialCipher::new(KEY).unwrap();
        assert_ne!(cipher.encrypt("pw").unwrap(), cipher.encrypt("pw").unwrap());
    }

    #[test]
    fn rejects_short_keys_and_tampered_ciphertext() {
        assert!(matches!(
            CredentialCipher::new("c2hvcnQ="),
            Err(EncryptionError::InvalidKeyLength)
        ));

        let cipher = CredentialCipher::new(KEY).unwrap();
        let mut sealed = cipher.encrypt("pw").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(cipher.decrypt(&sealed).is_err());
        assert!(cipher.decrypt(&[1, 2, 3]).is_err());
    }
}
