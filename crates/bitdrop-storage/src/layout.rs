//! Path construction and parsing for the on-disk layout

use std::path::{Path, PathBuf};

use bitdrop_core::{StoreKey, UploadId};

/// Staging index reserved for the duplicate-chunk poison marker
pub const POISON_INDEX: u64 = 0;

const STAGING_DIR: &str = "staging";
const STORE_DIR: &str = "store";
const TOTAL_PREFIX: &str = "of-";

/// Resolves every path under one storage root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn store_root(&self) -> PathBuf {
        self.root.join(STORE_DIR)
    }

    /// `staging/{id}`
    pub fn staging_dir(&self, upload_id: &UploadId) -> PathBuf {
        self.staging_root().join(upload_id.to_string())
    }

    /// `staging/{id}/of-{total}`
    pub fn total_dir(&self, upload_id: &UploadId, total: u64) -> PathBuf {
        self.staging_dir(upload_id).join(total_dir_name(total))
    }

    /// `staging/{id}/of-{total}/{index}`
    pub fn staged_chunk(&self, upload_id: &UploadId, total: u64, index: u64) -> PathBuf {
        self.total_dir(upload_id, total).join(index.to_string())
    }

    /// `store/{timestamp}/{id}/{hash}`: the subtree removed on delete
    pub fn entry_dir(&self, key: &StoreKey) -> PathBuf {
        self.store_root()
            .join(&key.timestamp)
            .join(key.upload_id.to_string())
            .join(key.content_hash.as_str())
    }

    /// `store/{timestamp}/{id}/{hash}/{filename}`: holds the chunk files
    pub fn record_dir(&self, key: &StoreKey) -> PathBuf {
        self.entry_dir(key).join(key.filename.as_str())
    }
}

pub fn total_dir_name(total: u64) -> String {
    format!("{TOTAL_PREFIX}{total}")
}

/// Parse an `of-{total}` directory name.
pub fn parse_total_dir(name: &str) -> Option<u64> {
    name.strip_prefix(TOTAL_PREFIX).and_then(parse_chunk_index)
}

/// Parse a chunk file name. Only plain decimal digits are accepted.
pub fn parse_chunk_index(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
