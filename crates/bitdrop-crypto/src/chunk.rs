//! Per-chunk AES-256-GCM sealing and opening
//!
//! Encrypted chunk format (before base64):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! No AAD: browser senders encrypt with WebCrypto's plain AES-GCM, so the
//! chunk position is not bound into the tag. Reordering is caught by the
//! whole-file SHA-256 check instead.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::RngCore;
use thiserror::Error;

use crate::kdf::DerivedKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Why a single chunk could not be opened.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk is not valid base64: {0}")]
    Decode(String),

    #[error("encrypted chunk too short: {len} bytes (minimum {min})", min = NONCE_SIZE + TAG_SIZE)]
    TooShort { len: usize },

    #[error("authentication failed: wrong password or tampered data")]
    Authentication,
}

/// Encrypt one plaintext chunk under a fresh random nonce.
///
/// Returns the base64 text that senders submit as `encryptedData`.
pub fn seal_chunk(key: &DerivedKey, plaintext: &[u8]) -> anyhow::Result<String> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("chunk encryption failed: {e}"))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(B64.encode(sealed))
}

/// Decode and decrypt one stored chunk.
pub fn open_chunk(key: &DerivedKey, payload: &str) -> Result<Vec<u8>, ChunkError> {
    let encrypted = B64
        .decode(payload.trim())
        .map_err(|e| ChunkError::Decode(e.to_string()))?;

    if encrypted.len() < NONCE_SIZE + TAG_SIZE {
        return Err(ChunkError::TooShort {
            len: encrypted.len(),
        });
    }

    // aes-gcm expects ciphertext || tag, which is exactly the remainder
    let (nonce_bytes, ciphertext_and_tag) = encrypted.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext_and_tag)
        .map_err(|_| ChunkError::Authentication)
}

/// Split a plaintext into sender-sized chunks.
///
/// An empty input still yields one (empty) chunk so that every upload has
/// at least index 1.
pub fn split_plaintext(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if data.is_empty() {
        return vec![data];
    }
    data.chunks(chunk_size.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> DerivedKey {
        DerivedKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = key(0x42);
        let plaintext = b"hello, encrypted world!";

        let sealed = seal_chunk(&key, plaintext).unwrap();
        let opened = open_chunk(&key, &sealed).unwrap();

        assert_eq!(&opened, plaintext);
    }

    #[test]
    fn test_seal_open_empty() {
        let key = key(0);

        let sealed = seal_chunk(&key, b"").unwrap();
        let opened = open_chunk(&key, &sealed).unwrap();

        assert_eq!(opened, b"");
    }

    #[test]
    fn test_sealed_size() {
        let key = key(1);
        let plaintext = vec![0u8; 1000];

        let sealed = seal_chunk(&key, &plaintext).unwrap();
        let raw = B64.decode(sealed).unwrap();

        // nonce (12) + plaintext (1000) + tag (16) = 1028
        assert_eq!(raw.len(), 12 + 1000 + 16);
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = key(1);
        let a = seal_chunk(&key, b"same").unwrap();
        let b = seal_chunk(&key, b"same").unwrap();
        assert_ne!(a, b, "each seal must use a new nonce");
    }

    #[test]
    fn test_open_wrong_key() {
        let sealed = seal_chunk(&key(1), b"secret data").unwrap();
        assert_eq!(
            open_chunk(&key(2), &sealed),
            Err(ChunkError::Authentication)
        );
    }

    #[test]
    fn test_open_tampered_ciphertext() {
        let key = key(3);
        let sealed = seal_chunk(&key, b"secret data").unwrap();
        let mut raw = B64.decode(sealed).unwrap();
        // Flip a byte in the ciphertext (after nonce)
        raw[NONCE_SIZE + 1] ^= 0xFF;

        let result = open_chunk(&key, &B64.encode(raw));
        assert_eq!(result, Err(ChunkError::Authentication));
    }

    #[test]
    fn test_open_rejects_garbage() {
        let key = key(4);
        assert!(matches!(
            open_chunk(&key, "***not base64***"),
            Err(ChunkError::Decode(_))
        ));
        assert_eq!(
            open_chunk(&key, &B64.encode([0u8; 10])),
            Err(ChunkError::TooShort { len: 10 })
        );
    }

    #[test]
    fn test_split_plaintext() {
        let data = vec![7u8; 25];
        let parts = split_plaintext(&data, 10);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 5);

        let empty = split_plaintext(&[], 10);
        assert_eq!(empty.len(), 1);
        assert!(empty[0].is_empty());
    }
}
