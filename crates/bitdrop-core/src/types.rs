use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{BitdropError, BitdropResult};

/// Identifier of a single upload: a random 128-bit id chosen by the sender.
pub type UploadId = uuid::Uuid;

/// Longest filename accepted as a durable path segment.
pub const MAX_FILENAME_BYTES: usize = 255;

/// Hex digest of the full original plaintext, supplied by the uploader.
///
/// Doubles as the key-derivation salt source, so it must stay a plain hex
/// string: non-empty, even length, ASCII hex digits only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub fn parse(s: &str) -> BitdropResult<Self> {
        if s.is_empty() || s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BitdropError::InvalidHash(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a recomputed hex digest.
    pub fn matches_digest(&self, digest_hex: &str) -> bool {
        self.0.eq_ignore_ascii_case(digest_hex)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = BitdropError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Original filename of a stored file. Used verbatim as one path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileName(String);

impl FileName {
    pub fn parse(s: &str) -> BitdropResult<Self> {
        let invalid = s.is_empty()
            || s == "."
            || s == ".."
            || s.len() > MAX_FILENAME_BYTES
            || s.contains(['/', '\\', '\0']);
        if invalid {
            return Err(BitdropError::InvalidFilename(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FileName {
    type Error = BitdropError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FileName> for String {
    fn from(value: FileName) -> Self {
        value.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four-part key of a finalized file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    /// Finalize time, `YYYY-MM-DDTHH:MM:SS`
    pub timestamp: String,
    pub upload_id: UploadId,
    pub content_hash: ContentHash,
    pub filename: FileName,
}

/// A finalized file as tracked by the durable index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub key: StoreKey,
    /// Number of chunks committed at finalize time
    pub chunk_count: usize,
}

/// Where a received chunk landed in the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChunk {
    pub upload_id: UploadId,
    pub index: u64,
    pub total: u64,
    pub path: PathBuf,
}

/// Result of a successful finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeReceipt {
    pub upload_id: UploadId,
    pub filename: String,
    pub timestamp: String,
    /// Set when a notification was delivered
    pub delivery_id: Option<String>,
    /// Retrieval reference handed to the recipient
    pub link: String,
}

/// All encoded chunks of a stored file, in index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSet {
    pub filename: String,
    pub content_hash: String,
    pub chunks: Vec<String>,
}

/// One encoded chunk of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleChunk {
    pub filename: String,
    pub content_hash: String,
    /// Chunk count of the whole stored file
    pub total_chunks: usize,
    pub chunk: String,
}

/// Retrieval reference for an upload, relative to the public site.
pub fn retrieval_link(upload_id: &UploadId) -> String {
    format!("/verify?id={upload_id}")
}
