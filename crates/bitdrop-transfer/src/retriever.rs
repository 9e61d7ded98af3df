//! Read access to finalized uploads

use std::sync::Arc;

use bitdrop_core::{BitdropResult, ChunkSet, SingleChunk, StoredFile, UploadId};
use bitdrop_storage::DurableStore;

/// Resolves upload ids to stored files and serves their raw chunks.
#[derive(Debug, Clone)]
pub struct ContentRetriever {
    store: Arc<DurableStore>,
}

impl ContentRetriever {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    /// The single stored file for `upload_id`.
    ///
    /// `NotFound` when nothing matches, `Ambiguous` when more than one record
    /// carries the id.
    pub async fn lookup(&self, upload_id: &UploadId) -> BitdropResult<StoredFile> {
        self.store.resolve(upload_id).await
    }

    /// Number of chunk files on disk for the stored file.
    pub async fn chunk_count(&self, upload_id: &UploadId) -> BitdropResult<usize> {
        let file = self.lookup(upload_id).await?;
        Ok(self.store.list_chunks(&file).await?.len())
    }

    pub async fn fetch_all(&self, upload_id: &UploadId) -> BitdropResult<ChunkSet> {
        let file = self.lookup(upload_id).await?;
        let chunks = self.store.read_all(&file).await?;
        Ok(ChunkSet {
            filename: file.key.filename.to_string(),
            content_hash: file.key.content_hash.to_string(),
            chunks,
        })
    }

    pub async fn fetch_chunk(&self, upload_id: &UploadId, index: u64) -> BitdropResult<SingleChunk> {
        let file = self.lookup(upload_id).await?;
        let chunk = self.store.read_chunk(&file, index).await?;
        Ok(SingleChunk {
            filename: file.key.filename.to_string(),
            content_hash: file.key.content_hash.to_string(),
            total_chunks: file.chunk_count,
            chunk,
        })
    }

    /// Stored file plus its payloads, for decryption.
    pub(crate) async fn load(&self, upload_id: &UploadId) -> BitdropResult<(StoredFile, Vec<String>)> {
        let file = self.lookup(upload_id).await?;
        let payloads = self.store.read_all(&file).await?;
        Ok((file, payloads))
    }
}
