//! Durable store of finalized uploads
//!
//! On disk a finalized file is `store/{timestamp}/{id}/{hash}/{filename}/`
//! holding chunk files `1..=N`. In memory every file is a [`StoredFile`] in
//! an index keyed by upload id. The index is built by scanning `store/` when
//! the store is opened and kept current by [`DurableStore::promote`] and
//! [`DurableStore::remove`].
//!
//! An upload id is finalized at most once: `promote` claims the id for the
//! duration of the copy and refuses ids that are claimed or already indexed.
//! The exclusive creation of the record directory backs this up on disk.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bitdrop_core::{
    BitdropError, BitdropResult, ContentHash, FileName, StoreKey, StoredFile, UploadId,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::layout::{parse_chunk_index, Layout};
use crate::staging::StagingSnapshot;

type Index = HashMap<UploadId, Vec<StoredFile>>;

#[derive(Debug)]
pub struct DurableStore {
    layout: Layout,
    index: RwLock<Index>,
    /// Upload ids with a promotion in flight
    claims: Mutex<HashSet<UploadId>>,
}

impl DurableStore {
    /// Open the store under `layout`, creating `store/` if needed and
    /// indexing everything already on disk.
    pub async fn open(layout: Layout) -> BitdropResult<Self> {
        tokio::fs::create_dir_all(layout.store_root()).await?;
        let index = scan(&layout).await?;
        info!(
            root = %layout.store_root().display(),
            uploads = index.len(),
            "durable store opened"
        );
        Ok(Self {
            layout,
            index: RwLock::new(index),
            claims: Mutex::new(HashSet::new()),
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Rebuild the index from disk.
    pub async fn rescan(&self) -> BitdropResult<usize> {
        let fresh = scan(&self.layout).await?;
        let count = fresh.len();
        *self.index.write().await = fresh;
        Ok(count)
    }

    /// Resolve an upload id to its single stored file.
    pub async fn resolve(&self, upload_id: &UploadId) -> BitdropResult<StoredFile> {
        let index = self.index.read().await;
        match index.get(upload_id).map(Vec::as_slice) {
            None | Some([]) => Err(BitdropError::NotFound(*upload_id)),
            Some([file]) => Ok(file.clone()),
            Some(files) => Err(BitdropError::Ambiguous {
                upload_id: *upload_id,
                matches: files.len(),
            }),
        }
    }

    /// All stored files of an upload with the given content hash.
    pub async fn matching(&self, upload_id: &UploadId, content_hash: &str) -> Vec<StoredFile> {
        let index = self.index.read().await;
        index
            .get(upload_id)
            .map(|files| {
                files
                    .iter()
                    .filter(|f| f.key.content_hash.as_str() == content_hash)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn is_indexed(&self, upload_id: &UploadId) -> bool {
        self.index
            .read()
            .await
            .get(upload_id)
            .is_some_and(|files| !files.is_empty())
    }

    /// Copy a complete staging snapshot into the durable location for `key`.
    ///
    /// Fails with `AlreadyFinalized`, touching nothing, when the upload id is
    /// already stored or being promoted, or when the record directory exists.
    /// A failed copy removes the partially written record before returning.
    pub async fn promote(
        &self,
        key: &StoreKey,
        snapshot: &StagingSnapshot,
    ) -> BitdropResult<StoredFile> {
        snapshot.ensure_complete()?;

        let upload_id = key.upload_id;
        {
            let mut claims = self.claims.lock().await;
            if claims.contains(&upload_id) || self.is_indexed(&upload_id).await {
                return Err(BitdropError::AlreadyFinalized(upload_id));
            }
            claims.insert(upload_id);
        }

        let result = self.promote_claimed(key, snapshot).await;
        self.claims.lock().await.remove(&upload_id);
        result
    }

    async fn promote_claimed(
        &self,
        key: &StoreKey,
        snapshot: &StagingSnapshot,
    ) -> BitdropResult<StoredFile> {
        let record_dir = self.layout.record_dir(key);
        if let Some(parent) = record_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::create_dir(&record_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BitdropError::AlreadyFinalized(key.upload_id));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = copy_chunks(snapshot, &record_dir).await {
            warn!(upload_id = %key.upload_id, "promotion failed, removing partial record: {e}");
            self.remove_entry(key).await;
            return Err(e);
        }

        let stored = StoredFile {
            key: key.clone(),
            chunk_count: snapshot.total as usize,
        };
        self.index
            .write()
            .await
            .entry(key.upload_id)
            .or_default()
            .push(stored.clone());

        info!(
            upload_id = %key.upload_id,
            timestamp = %key.timestamp,
            chunks = stored.chunk_count,
            "upload committed to durable store"
        );
        Ok(stored)
    }

    /// Chunk files of a stored file, ordered by numeric index.
    pub async fn list_chunks(&self, file: &StoredFile) -> BitdropResult<Vec<(u64, PathBuf)>> {
        let dir = self.layout.record_dir(&file.key);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BitdropError::NotFound(file.key.upload_id));
            }
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(index) = entry.file_name().to_str().and_then(parse_chunk_index) {
                chunks.push((index, entry.path()));
            }
        }
        chunks.sort_unstable_by_key(|(index, _)| *index);
        Ok(chunks)
    }

    /// Every chunk payload of a stored file, in index order.
    pub async fn read_all(&self, file: &StoredFile) -> BitdropResult<Vec<String>> {
        let mut payloads = Vec::new();
        for (_, path) in self.list_chunks(file).await? {
            payloads.push(tokio::fs::read_to_string(&path).await?);
        }
        Ok(payloads)
    }

    /// One chunk payload by index.
    pub async fn read_chunk(&self, file: &StoredFile, index: u64) -> BitdropResult<String> {
        let path = self.layout.record_dir(&file.key).join(index.to_string());
        match tokio::fs::read_to_string(&path).await {
            Ok(payload) => Ok(payload),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BitdropError::ChunkNotFound {
                upload_id: file.key.upload_id,
                index,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every stored file matching `upload_id` and `content_hash`.
    ///
    /// Deletes the `store/{timestamp}/{id}/{hash}` subtree of each match and
    /// prunes the id and timestamp directories once they are empty.
    pub async fn remove(
        &self,
        upload_id: &UploadId,
        content_hash: &str,
    ) -> BitdropResult<Vec<StoredFile>> {
        // held across the deletes so readers never see a half-removed entry
        let mut index = self.index.write().await;
        let matched: Vec<StoredFile> = index
            .get(upload_id)
            .map(|files| {
                files
                    .iter()
                    .filter(|f| f.key.content_hash.as_str() == content_hash)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if matched.is_empty() {
            return Err(record_not_found(upload_id, content_hash));
        }

        let mut removed = Vec::with_capacity(matched.len());
        let mut failure = None;
        for file in matched {
            let entry = self.layout.entry_dir(&file.key);
            match tokio::fs::remove_dir_all(&entry).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %entry.display(), "failed to delete stored file: {e}");
                    failure = Some(e);
                    break;
                }
            }
            self.prune_parents(&entry).await;
            info!(upload_id = %upload_id, timestamp = %file.key.timestamp, "stored file deleted");
            removed.push(file);
        }

        // only entries that are gone from disk leave the index
        if let Some(files) = index.get_mut(upload_id) {
            files.retain(|f| !removed.contains(f));
            if files.is_empty() {
                index.remove(upload_id);
            }
        }
        drop(index);

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(removed),
        }
    }

    /// Best-effort removal of a record created by a failed promotion.
    async fn remove_entry(&self, key: &StoreKey) {
        let entry = self.layout.entry_dir(key);
        if let Err(e) = tokio::fs::remove_dir_all(&entry).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %entry.display(), "failed to remove partial record: {e}");
            }
        }
        self.prune_parents(&entry).await;
    }

    /// Remove the `{id}` and `{timestamp}` directories above `entry` if empty.
    async fn prune_parents(&self, entry: &Path) {
        let store_root = self.layout.store_root();
        let mut dir = entry.parent();
        while let Some(current) = dir {
            if current == store_root.as_path() {
                break;
            }
            // remove_dir refuses non-empty directories, which ends the walk
            if tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

fn record_not_found(upload_id: &UploadId, content_hash: &str) -> BitdropError {
    BitdropError::RecordNotFound {
        upload_id: *upload_id,
        content_hash: content_hash.to_string(),
    }
}

async fn copy_chunks(snapshot: &StagingSnapshot, record_dir: &Path) -> BitdropResult<()> {
    for index in 1..=snapshot.total {
        let dest = record_dir.join(index.to_string());
        tokio::fs::copy(snapshot.chunk_path(index), &dest).await?;
    }
    debug!(
        upload_id = %snapshot.upload_id,
        chunks = snapshot.total,
        dest = %record_dir.display(),
        "staged chunks copied"
    );
    Ok(())
}

/// Subdirectories of `dir` as `(name, path)` pairs. Missing dirs are empty.
async fn subdirs(dir: &Path) -> BitdropResult<Vec<(String, PathBuf)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => dirs.push((name, entry.path())),
            Err(name) => warn!(name = ?name, "skipping non-UTF-8 store entry"),
        }
    }
    Ok(dirs)
}

async fn count_chunks(dir: &Path) -> BitdropResult<usize> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_str().and_then(parse_chunk_index).is_some() {
            count += 1;
        }
    }
    Ok(count)
}

/// Walk `store/{timestamp}/{id}/{hash}/{filename}` and index every record.
async fn scan(layout: &Layout) -> BitdropResult<Index> {
    let mut index = Index::new();
    for (timestamp, ts_path) in subdirs(&layout.store_root()).await? {
        for (id_name, id_path) in subdirs(&ts_path).await? {
            let Ok(upload_id) = UploadId::parse_str(&id_name) else {
                warn!(path = %id_path.display(), "skipping store entry with invalid upload id");
                continue;
            };
            for (hash_name, hash_path) in subdirs(&id_path).await? {
                let Ok(content_hash) = ContentHash::parse(&hash_name) else {
                    warn!(path = %hash_path.display(), "skipping store entry with invalid hash");
                    continue;
                };
                for (file_name, file_path) in subdirs(&hash_path).await? {
                    let Ok(filename) = FileName::parse(&file_name) else {
                        warn!(path = %file_path.display(), "skipping store entry with invalid filename");
                        continue;
                    };
                    let chunk_count = count_chunks(&file_path).await?;
                    index.entry(upload_id).or_default().push(StoredFile {
                        key: StoreKey {
                            timestamp: timestamp.clone(),
                            upload_id,
                            content_hash: content_hash.clone(),
                            filename,
                        },
                        chunk_count,
                    });
                }
            }
        }
    }
    Ok(index)
}
