//! Chunk-by-chunk assembly with a single trailing integrity check
//!
//! Every chunk is processed, whatever happens to the ones before it. A chunk
//! that fails to open is replaced in the output by a marker line naming its
//! index and the failure, which guarantees the assembled digest differs from
//! the uploader's hash. Callers classify the result by [`Assembly::matches`]
//! only.

use crate::chunk::{open_chunk, ChunkError};
use crate::digest::Sha256Stream;
use crate::kdf::DerivedKey;

/// Result of opening one chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    Verified(Vec<u8>),
    Rejected { index: u64, error: ChunkError },
}

impl ChunkOutcome {
    /// Open the chunk at 1-based `index`.
    pub fn open(key: &DerivedKey, index: u64, payload: &str) -> Self {
        match open_chunk(key, payload) {
            Ok(plaintext) => ChunkOutcome::Verified(plaintext),
            Err(error) => ChunkOutcome::Rejected { index, error },
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, ChunkOutcome::Verified(_))
    }

    /// Bytes this chunk contributes to the assembled stream.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ChunkOutcome::Verified(plaintext) => plaintext,
            ChunkOutcome::Rejected { index, error } => {
                format!("BAD CHUNK {index} ({error})\n").into_bytes()
            }
        }
    }
}

/// The assembled plaintext of a file plus what the integrity check needs.
#[derive(Debug)]
pub struct Assembly {
    pub plaintext: Vec<u8>,
    /// Hex SHA-256 of `plaintext`
    pub digest_hex: String,
    /// 1-based indices of chunks that failed to open
    pub rejected: Vec<u64>,
    pub chunk_count: usize,
}

impl Assembly {
    /// Case-insensitive comparison against the uploader's content hash.
    pub fn matches(&self, expected_hex: &str) -> bool {
        self.digest_hex.eq_ignore_ascii_case(expected_hex)
    }
}

/// Open every payload in order and assemble the output stream.
pub fn assemble_chunks<S: AsRef<str>>(key: &DerivedKey, payloads: &[S]) -> Assembly {
    let mut plaintext = Vec::new();
    let mut rejected = Vec::new();
    let mut digest = Sha256Stream::new();

    for (position, payload) in payloads.iter().enumerate() {
        let index = position as u64 + 1;
        let outcome = ChunkOutcome::open(key, index, payload.as_ref());
        if !outcome.is_verified() {
            tracing::debug!(index, "chunk rejected during assembly");
            rejected.push(index);
        }
        let bytes = outcome.into_bytes();
        digest.update(&bytes);
        plaintext.extend_from_slice(&bytes);
    }

    Assembly {
        plaintext,
        digest_hex: digest.finish_hex(),
        rejected,
        chunk_count: payloads.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{seal_chunk, split_plaintext};
    use crate::digest::sha256_hex;

    fn seal_all(key: &DerivedKey, data: &[u8], size: usize) -> Vec<String> {
        split_plaintext(data, size)
            .into_iter()
            .map(|part| seal_chunk(key, part).unwrap())
            .collect()
    }

    #[test]
    fn correct_key_reassembles_exactly() {
        let key = DerivedKey::from_bytes([9u8; 32]);
        let original: Vec<u8> = (0u32..10_000).map(|i| (i % 251) as u8).collect();
        let payloads = seal_all(&key, &original, 3_000);

        let assembly = assemble_chunks(&key, &payloads);

        assert_eq!(assembly.chunk_count, 4);
        assert!(assembly.rejected.is_empty());
        assert_eq!(assembly.plaintext, original);
        assert!(assembly.matches(&sha256_hex(&original)));
        assert!(assembly.matches(&sha256_hex(&original).to_uppercase()));
    }

    #[test]
    fn wrong_key_marks_every_chunk_and_keeps_going() {
        let right = DerivedKey::from_bytes([1u8; 32]);
        let wrong = DerivedKey::from_bytes([2u8; 32]);
        let original = b"three chunks worth of data!".to_vec();
        let payloads = seal_all(&right, &original, 10);

        let assembly = assemble_chunks(&wrong, &payloads);

        assert_eq!(assembly.rejected, vec![1, 2, 3]);
        assert!(!assembly.matches(&sha256_hex(&original)));
        let text = String::from_utf8(assembly.plaintext).unwrap();
        assert!(text.starts_with("BAD CHUNK 1 (authentication failed"));
        assert!(text.contains("BAD CHUNK 3 "));
    }

    #[test]
    fn single_tampered_chunk_is_isolated() {
        let key = DerivedKey::from_bytes([5u8; 32]);
        let original = b"aaaaabbbbbccccc".to_vec();
        let mut payloads = seal_all(&key, &original, 5);
        payloads[1] = "garbage".to_string();

        let assembly = assemble_chunks(&key, &payloads);

        assert_eq!(assembly.rejected, vec![2]);
        assert!(assembly.plaintext.starts_with(b"aaaaa"));
        assert!(assembly.plaintext.ends_with(b"ccccc"));
        assert!(!assembly.matches(&sha256_hex(&original)));
    }

    #[test]
    fn digest_covers_assembled_bytes() {
        let key = DerivedKey::from_bytes([6u8; 32]);
        let payloads = seal_all(&key, b"payload", 3);
        let assembly = assemble_chunks(&key, &payloads);
        assert_eq!(assembly.digest_hex, sha256_hex(&assembly.plaintext));
    }
}
