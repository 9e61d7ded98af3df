//! Removal of finalized uploads

use std::sync::Arc;

use bitdrop_core::{BitdropResult, UploadId};
use bitdrop_storage::DurableStore;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RecordDeleter {
    store: Arc<DurableStore>,
}

impl RecordDeleter {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    /// Delete every stored file matching both the id and the content hash.
    ///
    /// Returns how many records were removed; `RecordNotFound` if none match.
    pub async fn delete(&self, upload_id: &UploadId, content_hash: &str) -> BitdropResult<usize> {
        let removed = self.store.remove(upload_id, content_hash).await?;
        info!(upload_id = %upload_id, records = removed.len(), "upload deleted");
        Ok(removed.len())
    }
}
