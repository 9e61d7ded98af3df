//! SHA-256 content hashing (lowercase hex, as browsers produce it)

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a complete buffer.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Incremental SHA-256 for callers that see a file piece by piece.
#[derive(Default, Clone)]
pub struct Sha256Stream {
    hasher: Sha256,
}

impl Sha256Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finish_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
