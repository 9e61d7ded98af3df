//! Server-side decryption of finalized uploads
//!
//! A wrong password is not an error. Every chunk is opened, failures become
//! markers in the output, and the SHA-256 of the assembled bytes against the
//! stored content hash decides between `Ok` and `Corrupt`.

use std::fmt;

use bitdrop_core::{BitdropError, BitdropResult, StoredFile, UploadId};
use bitdrop_crypto::{assemble_chunks, derive_key, salt_from_hash, Assembly, KdfParams};
use secrecy::SecretString;
use tracing::{info, warn};

use crate::retriever::ContentRetriever;

/// Client-visible classification of a decryption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptStatus {
    Ok,
    Corrupt,
    Missing,
    Duplicate,
}

impl DecryptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecryptStatus::Ok => "OK",
            DecryptStatus::Corrupt => "CORRUPT",
            DecryptStatus::Missing => "MISSING",
            DecryptStatus::Duplicate => "DUPLICATE",
        }
    }
}

impl fmt::Display for DecryptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored file after every chunk has been processed.
#[derive(Debug)]
pub struct DecryptedFile {
    pub filename: String,
    pub timestamp: String,
    pub chunk_count: usize,
    /// Content hash recorded at finalize
    pub hash_original: String,
    /// SHA-256 of `plaintext`
    pub hash_computed: String,
    /// Indices of chunks that failed authentication
    pub rejected_chunks: Vec<u64>,
    /// Only meaningful when the hashes agree
    pub plaintext: Vec<u8>,
}

impl DecryptedFile {
    fn from_assembly(file: &StoredFile, assembly: Assembly) -> Self {
        Self {
            filename: file.key.filename.to_string(),
            timestamp: file.key.timestamp.clone(),
            chunk_count: assembly.chunk_count,
            hash_original: file.key.content_hash.to_string(),
            hash_computed: assembly.digest_hex,
            rejected_chunks: assembly.rejected,
            plaintext: assembly.plaintext,
        }
    }

    pub fn is_intact(&self) -> bool {
        self.hash_original.eq_ignore_ascii_case(&self.hash_computed)
    }
}

#[derive(Debug)]
pub enum DecryptionOutcome {
    /// No stored file carries the id
    Missing,
    /// More than one stored file carries the id
    Duplicate { matches: usize },
    /// Every chunk was processed; see [`DecryptedFile::is_intact`]
    Assembled(DecryptedFile),
}

impl DecryptionOutcome {
    pub fn status(&self) -> DecryptStatus {
        match self {
            DecryptionOutcome::Missing => DecryptStatus::Missing,
            DecryptionOutcome::Duplicate { .. } => DecryptStatus::Duplicate,
            DecryptionOutcome::Assembled(file) if file.is_intact() => DecryptStatus::Ok,
            DecryptionOutcome::Assembled(_) => DecryptStatus::Corrupt,
        }
    }

    pub fn file(&self) -> Option<&DecryptedFile> {
        match self {
            DecryptionOutcome::Assembled(file) => Some(file),
            _ => None,
        }
    }

    pub fn into_file(self) -> Option<DecryptedFile> {
        match self {
            DecryptionOutcome::Assembled(file) => Some(file),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecryptionEngine {
    retriever: ContentRetriever,
    params: KdfParams,
}

impl DecryptionEngine {
    pub fn new(retriever: ContentRetriever, params: KdfParams) -> Self {
        Self { retriever, params }
    }

    /// Decrypt a stored file with a recipient's password.
    ///
    /// Errors only for infrastructure faults; missing, duplicate and corrupt
    /// files are outcomes.
    pub async fn decrypt(
        &self,
        upload_id: &UploadId,
        password: SecretString,
    ) -> BitdropResult<DecryptionOutcome> {
        let (file, payloads) = match self.retriever.load(upload_id).await {
            Ok(loaded) => loaded,
            Err(BitdropError::NotFound(_)) => {
                info!(upload_id = %upload_id, status = "MISSING", "decrypt");
                return Ok(DecryptionOutcome::Missing);
            }
            Err(BitdropError::Ambiguous { matches, .. }) => {
                warn!(upload_id = %upload_id, matches, status = "DUPLICATE", "decrypt");
                return Ok(DecryptionOutcome::Duplicate { matches });
            }
            Err(e) => return Err(e),
        };

        let content_hash = file.key.content_hash.to_string();
        let params = self.params.clone();
        // PBKDF2 and AES-GCM are CPU-bound
        let assembly = tokio::task::spawn_blocking(move || -> anyhow::Result<Assembly> {
            let salt = salt_from_hash(&content_hash)?;
            let key = derive_key(&password, &salt, &params)?;
            Ok(assemble_chunks(&key, &payloads))
        })
        .await
        .map_err(|e| anyhow::anyhow!("decryption task failed: {e}"))??;

        let decrypted = DecryptedFile::from_assembly(&file, assembly);
        let outcome = DecryptionOutcome::Assembled(decrypted);
        info!(
            upload_id = %upload_id,
            status = %outcome.status(),
            chunks = outcome.file().map(|f| f.chunk_count).unwrap_or_default(),
            rejected = outcome.file().map(|f| f.rejected_chunks.len()).unwrap_or_default(),
            "decrypt"
        );
        Ok(outcome)
    }
}
