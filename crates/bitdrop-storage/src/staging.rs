//! Per-upload staging area
//!
//! Chunks land in `staging/{id}/of-{total}/{index}` as they arrive. The first
//! chunk of an upload pins its total; later chunks must agree with it.
//! Chunk files are created with `create_new`, so two writers racing on the
//! same index cannot both succeed: the loser poisons the upload.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bitdrop_core::{BitdropError, BitdropResult, StagedChunk, UploadId};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::layout::{parse_chunk_index, parse_total_dir, Layout, POISON_INDEX};

#[derive(Debug, Clone)]
pub struct StagingArea {
    layout: Layout,
}

/// What a staging directory holds at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingSnapshot {
    pub upload_id: UploadId,
    pub total: u64,
    /// Chunk indices on disk, poison marker excluded
    pub present: BTreeSet<u64>,
    pub poisoned: bool,
    /// The `of-{total}` directory
    pub dir: PathBuf,
}

impl StagingSnapshot {
    /// True when present indices are exactly `1..=total` and the upload is
    /// not poisoned.
    pub fn is_complete(&self) -> bool {
        !self.poisoned && self.present.iter().copied().eq(1..=self.total)
    }

    pub fn missing(&self) -> Vec<u64> {
        (1..=self.total)
            .filter(|i| !self.present.contains(i))
            .collect()
    }

    pub fn ensure_complete(&self) -> BitdropResult<()> {
        if self.is_complete() {
            return Ok(());
        }
        Err(BitdropError::IncompleteUpload {
            total: self.total,
            present: self.present.iter().copied().collect(),
            poisoned: self.poisoned,
        })
    }

    pub fn chunk_path(&self, index: u64) -> PathBuf {
        self.dir.join(index.to_string())
    }
}

impl StagingArea {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Persist one chunk. Bounds are the caller's job except for the poison
    /// slot, which is never writable as a chunk.
    pub async fn write_chunk(
        &self,
        upload_id: &UploadId,
        index: u64,
        total: u64,
        payload: &str,
    ) -> BitdropResult<StagedChunk> {
        if index == POISON_INDEX || total == 0 {
            return Err(BitdropError::InvalidRange {
                index: index as i64,
                total: total as i64,
            });
        }
        if index > total {
            return Err(BitdropError::IndexOutOfBounds { index, total });
        }

        let totals = self.totals(upload_id).await?;
        if let Some(&expected) = totals.first() {
            if !totals.contains(&total) {
                return Err(BitdropError::TotalMismatch {
                    upload_id: *upload_id,
                    expected,
                    got: total,
                });
            }
        }

        let dir = self.layout.total_dir(upload_id, total);
        tokio::fs::create_dir_all(&dir).await?;

        if tokio::fs::try_exists(dir.join(POISON_INDEX.to_string())).await? {
            debug!(upload_id = %upload_id, index, "chunk rejected: upload already poisoned");
            return Err(BitdropError::DuplicateChunk(*upload_id));
        }

        let path = dir.join(index.to_string());
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                self.poison(&dir).await?;
                warn!(upload_id = %upload_id, index, total, "duplicate chunk: upload poisoned");
                return Err(BitdropError::DuplicateChunk(*upload_id));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = write_all(&mut file, payload.as_bytes()).await {
            // a half-written chunk would otherwise block the retry as a duplicate
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }

        debug!(upload_id = %upload_id, index, total, bytes = payload.len(), "chunk staged");
        Ok(StagedChunk {
            upload_id: *upload_id,
            index,
            total,
            path,
        })
    }

    /// Inspect the staging directory of an upload.
    pub async fn snapshot(&self, upload_id: &UploadId) -> BitdropResult<StagingSnapshot> {
        if !tokio::fs::try_exists(self.layout.staging_dir(upload_id)).await? {
            return Err(BitdropError::UploadNotFound(*upload_id));
        }

        let totals = self.totals(upload_id).await?;
        let &[total] = totals.as_slice() else {
            warn!(upload_id = %upload_id, dirs = totals.len(), "staging area has no single total directory");
            return Err(BitdropError::CorruptUpload(*upload_id));
        };

        let dir = self.layout.total_dir(upload_id, total);
        let mut present = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(index) = entry.file_name().to_str().and_then(parse_chunk_index) {
                present.insert(index);
            }
        }
        let poisoned = present.remove(&POISON_INDEX);

        Ok(StagingSnapshot {
            upload_id: *upload_id,
            total,
            present,
            poisoned,
            dir,
        })
    }

    /// Remove an upload's staging directory. Missing directories are fine.
    pub async fn discard(&self, upload_id: &UploadId) -> BitdropResult<()> {
        match tokio::fs::remove_dir_all(self.layout.staging_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete staging directories untouched for longer than `max_age`.
    ///
    /// Returns the number of uploads removed.
    pub async fn sweep(&self, max_age: Duration) -> BitdropResult<usize> {
        let mut entries = match tokio::fs::read_dir(self.layout.staging_root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let newest = newest_mtime(&path).await?;
            let idle = now.duration_since(newest).unwrap_or_default();
            if idle <= max_age {
                continue;
            }
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), idle_secs = idle.as_secs(), "swept stale upload");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "failed to sweep stale upload: {e}"),
            }
        }
        Ok(removed)
    }

    /// Totals announced by the `of-*` directories of an upload.
    async fn totals(&self, upload_id: &UploadId) -> BitdropResult<Vec<u64>> {
        let mut entries = match tokio::fs::read_dir(self.layout.staging_dir(upload_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut totals = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(total) = entry.file_name().to_str().and_then(parse_total_dir) {
                totals.push(total);
            }
        }
        totals.sort_unstable();
        Ok(totals)
    }

    async fn poison(&self, dir: &Path) -> BitdropResult<()> {
        tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(POISON_INDEX.to_string()))
            .await?;
        Ok(())
    }
}

async fn write_all(file: &mut tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

/// Latest modification time of a staging directory and its direct children.
async fn newest_mtime(dir: &Path) -> BitdropResult<SystemTime> {
    let mut newest = tokio::fs::metadata(dir).await?.modified()?;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let modified = entry.metadata().await?.modified()?;
        newest = newest.max(modified);
    }
    Ok(newest)
}
