//! Chunk ingestion into the staging area

use bitdrop_core::{BitdropError, BitdropResult, StagedChunk, UploadId};
use bitdrop_storage::StagingArea;
use tracing::debug;

/// Accepts encrypted chunks one at a time.
#[derive(Debug, Clone)]
pub struct ChunkReceiver {
    staging: StagingArea,
}

impl ChunkReceiver {
    pub fn new(staging: StagingArea) -> Self {
        Self { staging }
    }

    /// Validate and persist one chunk. `index` and `total` arrive as the
    /// signed integers senders submit.
    pub async fn receive(
        &self,
        upload_id: &UploadId,
        index: i64,
        total: i64,
        payload: &str,
    ) -> BitdropResult<StagedChunk> {
        let (index, total) = validate_range(index, total)?;
        debug!(upload_id = %upload_id, index, total, "receiving chunk");
        self.staging
            .write_chunk(upload_id, index, total, payload)
            .await
    }
}

/// Check a chunk's position: both values natural numbers, index within total.
pub fn validate_range(index: i64, total: i64) -> BitdropResult<(u64, u64)> {
    if index < 1 || total < 1 {
        return Err(BitdropError::InvalidRange { index, total });
    }
    let (index, total) = (index as u64, total as u64);
    if index > total {
        return Err(BitdropError::IndexOutOfBounds { index, total });
    }
    Ok((index, total))
}
