//! AES-256-GCM encryption of credential secrets stored at rest.
//!
//! The key is 32 bytes supplied as a hex-encoded string (64 characters).
//! Ciphertext is `nonce || ciphertext`, base64-encoded so it fits in the JSON blob.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;

use crate::error::{storage_error, Error, ErrorKind, StorageErrorKind};

/// 12-byte nonce size for AES-GCM
const NONCE_SIZE: usize = 12;

fn encryption_err() -> Error {
    storage_error(StorageErrorKind::EncryptionFailed, "failed to encrypt secret")
}

fn decryption_err() -> Error {
    storage_error(StorageErrorKind::DecryptionFailed, "failed to decrypt secret")
}

/// Encrypts and decrypts secrets with a fixed key.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Builds a cipher from a 64 character hex key.
    pub fn from_hex(key_hex: &str) -> Result<Self, Error> {
        let key = parse_key(key_hex)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| encryption_err())?;
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, Error> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| encryption_err())?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypts a value produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<String, Error> {
        let combined = BASE64.decode(ciphertext_b64).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Storage(StorageErrorKind::DecryptionFailed),
        })?;

        if combined.len() < NONCE_SIZE {
            return Err(decryption_err());
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext_bytes = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| decryption_err())?;

        String::from_utf8(plaintext_bytes).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Storage(StorageErrorKind::DecryptionFailed),
        })
    }
}

fn parse_key(key_hex: &str) -> Result<[u8; 32], Error> {
    let bytes = hex::decode(key_hex).map_err(|e| Error {
        source: Some(Box::new(e)),
        error_kind: ErrorKind::Storage(StorageErrorKind::EncryptionFailed),
    })?;
    if bytes.len() != 32 {
        return Err(encryption_err());
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn kind(result: Result<impl Sized, Error>) -> ErrorKind {
        match result {
            Err(e) => e.error_kind,
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_ciphertext_hides_secret_and_decrypts() {
        let cipher = SecretCipher::from_hex(TEST_KEY).unwrap();
        let encrypted = cipher.encrypt("AIzaSy-secret").unwrap();
        assert!(!encrypted.contains("AIzaSy-secret"));
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "AIzaSy-secret");
    }

    #[test]
    fn test_nonce_makes_each_ciphertext_unique() {
        let cipher = SecretCipher::from_hex(TEST_KEY).unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_malformed_keys_are_rejected() {
        assert_eq!(
            kind(SecretCipher::from_hex("not-hex")),
            ErrorKind::Storage(StorageErrorKind::EncryptionFailed)
        );
        assert_eq!(
            kind(SecretCipher::from_hex("abcd")),
            ErrorKind::Storage(StorageErrorKind::EncryptionFailed)
        );
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let encrypted = SecretCipher::from_hex(TEST_KEY)
            .unwrap()
            .encrypt("secret")
            .unwrap();
        let other = SecretCipher::from_hex(
            "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .unwrap();
        assert_eq!(
            kind(other.decrypt(&encrypted)),
            ErrorKind::Storage(StorageErrorKind::DecryptionFailed)
        );
    }

    #[test]
    fn test_truncated_or_garbage_ciphertext_fails() {
        let cipher = SecretCipher::from_hex(TEST_KEY).unwrap();
        assert_eq!(
            kind(cipher.decrypt("YWJj")),
            ErrorKind::Storage(StorageErrorKind::DecryptionFailed)
        );
        assert_eq!(
            kind(cipher.decrypt("not base64!!")),
            ErrorKind::Storage(StorageErrorKind::DecryptionFailed)
        );
    }
}
