//! Local disk cache in front of an [`ObjectStore`]
//!
//! Every read starts with a metadata-only `head` request. When the size and
//! last-modified time match the snapshot stored next to the cached content,
//! the local copy is served; otherwise the object is fetched again and the
//! entry is overwritten. The cache never evicts on its own, [`ObjectCache::expire`]
//! is the explicit cleanup. Every hit records its time in the snapshot, so
//! cleanup removes what has not been read for longest.
//!
//! Persisting is best effort. A failed write is logged and the fetched
//! content is still returned.

mod layout;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{Error, Result};
use crate::path::RemotePath;
use crate::traits::{ObjectInfo, ObjectStore};

pub use layout::{decode, encode, Layout};

/// Remote metadata captured when an object was fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub fetched_at: Timestamp,
    /// Last time the entry was served from the cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access: Option<Timestamp>,
}

impl CacheEntry {
    fn from_remote(info: &ObjectInfo) -> Self {
        Self {
            bucket: info.bucket.clone(),
            key: info.key.clone(),
            size_bytes: info.size_bytes,
            last_modified: info.last_modified,
            etag: info.etag.clone(),
            fetched_at: Timestamp::now(),
            last_access: None,
        }
    }

    /// Most recent fetch or hit
    pub fn last_used(&self) -> Timestamp {
        self.last_access
            .map_or(self.fetched_at, |at| at.max(self.fetched_at))
    }

    /// Location of the cached object
    pub fn path(&self) -> RemotePath {
        RemotePath::new(&self.bucket, &self.key)
    }

    /// Whether the remote object still looks like the one we fetched
    pub fn matches(&self, remote: &ObjectInfo) -> bool {
        self.size_bytes == remote.size_bytes && self.last_modified == remote.last_modified
    }
}

/// Where the returned content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Cache,
    Remote,
}

/// Object content plus the metadata it was validated against
#[derive(Debug, Clone)]
pub struct CachedObject {
    pub data: Vec<u8>,
    pub info: ObjectInfo,
    pub origin: Origin,
}

/// Outcome of [`ObjectCache::expire`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpireReport {
    pub removed: usize,
    pub freed_bytes: u64,
    pub remaining: usize,
    pub remaining_bytes: u64,
}

/// One async mutex per key, so concurrent readers of the same object
/// produce a single fetch and a single writer.
#[derive(Default)]
struct KeyLocks {
    inner: Mutex<HashMap<RemotePath, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, path: &RemotePath) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only the map still holds are idle.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(path.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Disk cache of remote objects
pub struct ObjectCache {
    layout: Layout,
    store: Arc<dyn ObjectStore>,
    locks: KeyLocks,
}

impl ObjectCache {
    /// Create a cache rooted at `root`
    ///
    /// Directories are created on first write, so an unwritable root only
    /// degrades the cache to a pass-through.
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            layout: Layout::new(root),
            store,
            locks: KeyLocks::default(),
        }
    }

    /// The cache root directory
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Local file holding the cached content of `path`
    pub fn local_path(&self, path: &RemotePath) -> PathBuf {
        self.layout.data_path(path)
    }

    /// Get an object's content, from the cache when it is still fresh
    pub async fn get_object(&self, path: &RemotePath) -> Result<Vec<u8>> {
        Ok(self.get(path).await?.data)
    }

    /// Like [`get_object`](Self::get_object), also reporting where the data came from
    pub async fn get(&self, path: &RemotePath) -> Result<CachedObject> {
        let _guard = self.locks.acquire(path).await;

        let remote = self.store.head_object(path).await?;

        if let Some((entry, data)) = self.read_fresh(path, &remote).await {
            tracing::debug!(%path, "cache hit");
            self.touch(path, entry).await;
            return Ok(CachedObject {
                data,
                info: remote,
                origin: Origin::Cache,
            });
        }

        tracing::debug!(%path, "cache miss, fetching");
        let data = self.store.get_object(path).await?;

        if remote.size_bytes.is_some_and(|size| size != data.len() as i64) {
            tracing::warn!(
                %path,
                expected = ?remote.size_bytes,
                actual = data.len(),
                "object changed while fetching, not caching"
            );
        } else if let Err(e) = self.persist(path, &remote, &data).await {
            tracing::warn!(%path, error = %e, "cache write failed, serving fetched content");
        }

        Ok(CachedObject {
            data,
            info: remote,
            origin: Origin::Remote,
        })
    }

    /// Read the cached content if its snapshot matches `remote`
    async fn read_fresh(
        &self,
        path: &RemotePath,
        remote: &ObjectInfo,
    ) -> Option<(CacheEntry, Vec<u8>)> {
        let entry = match self.read_entry(path).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%path, error = %e, "unreadable cache metadata, refetching");
                return None;
            }
        };

        if !entry.matches(remote) {
            tracing::debug!(
                %path,
                cached_size = ?entry.size_bytes,
                remote_size = ?remote.size_bytes,
                "cache entry is stale"
            );
            return None;
        }

        match tokio::fs::read(self.layout.data_path(path)).await {
            Ok(data) if entry.size_bytes.is_none_or(|size| size == data.len() as i64) => {
                Some((entry, data))
            }
            Ok(_) => {
                tracing::warn!(%path, "cached content is truncated, refetching");
                None
            }
            Err(e) => {
                tracing::debug!(%path, error = %e, "cached content missing");
                None
            }
        }
    }

    /// Record a hit in the snapshot; failures only cost expiry precision
    async fn touch(&self, path: &RemotePath, mut entry: CacheEntry) {
        entry.last_access = Some(Timestamp::now());
        let result = match serde_json::to_vec_pretty(&entry) {
            Ok(snapshot) => {
                self.write_atomic(path, &self.layout.meta_path(path), &snapshot)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::debug!(%path, error = %e, "couldn't record cache hit");
        }
    }

    async fn read_entry(&self, path: &RemotePath) -> Result<Option<CacheEntry>> {
        match tokio::fs::read(self.layout.meta_path(path)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write content then snapshot, each through a temp file and rename
    ///
    /// The old snapshot goes first, so a crash part way leaves an entry
    /// that reads as a miss rather than stale content passing as fresh.
    async fn persist(&self, path: &RemotePath, remote: &ObjectInfo, data: &[u8]) -> Result<()> {
        for dir in [
            self.layout.data_dir(),
            self.layout.meta_dir(),
            self.layout.tmp_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| cache_write(&dir, e))?;
        }

        let meta_path = self.layout.meta_path(path);
        remove_if_exists(&meta_path)
            .await
            .map_err(|e| cache_write(&meta_path, e))?;

        self.write_atomic(path, &self.layout.data_path(path), data)
            .await?;

        let snapshot = serde_json::to_vec_pretty(&CacheEntry::from_remote(remote))?;
        self.write_atomic(path, &meta_path, &snapshot).await?;

        tracing::debug!(%path, bytes = data.len(), "cached");
        Ok(())
    }

    async fn write_atomic(&self, path: &RemotePath, target: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = self.layout.tmp_path(path);
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(cache_write(&tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(cache_write(target, e));
        }
        Ok(())
    }

    /// Drop the cached copy of one object
    ///
    /// Returns whether anything was removed.
    pub async fn invalidate(&self, path: &RemotePath) -> Result<bool> {
        let _guard = self.locks.acquire(path).await;
        let meta = remove_if_exists(&self.layout.meta_path(path)).await?;
        let data = remove_if_exists(&self.layout.data_path(path)).await?;
        Ok(meta || data)
    }

    /// Snapshots of every cached object, ordered by bucket and key
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(self.layout.meta_dir()).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            let Some(path) = name.to_str().and_then(decode) else {
                tracing::warn!(file = ?item.path(), "unrecognised file in cache, skipped");
                continue;
            };
            match self.read_entry(&path).await {
                Ok(Some(entry)) if entry.path() == path => entries.push(entry),
                Ok(_) => {
                    tracing::warn!(%path, "cache metadata does not match its file name, skipped");
                }
                Err(e) => tracing::warn!(%path, error = %e, "unreadable cache metadata, skipped"),
            }
        }

        entries.sort_by(|a, b| (&a.bucket, &a.key).cmp(&(&b.bucket, &b.key)));
        Ok(entries)
    }

    /// Remove old entries and trim the cache to a size budget
    ///
    /// Entries not fetched or read within `max_age` are removed, then the
    /// least recently used of the rest go until at most `max_bytes` remain.
    /// Leftover temp files and content without a snapshot are always removed.
    pub async fn expire(
        &self,
        max_age: Option<Duration>,
        max_bytes: Option<u64>,
    ) -> Result<ExpireReport> {
        let mut report = ExpireReport::default();
        report.freed_bytes += clear_dir(&self.layout.tmp_dir()).await?;

        let mut entries = Vec::new();
        for entry in self.entries().await? {
            let size = file_size(&self.layout.data_path(&entry.path())).await;
            entries.push((entry, size));
        }
        // Most recently used first, so the size budget keeps those.
        entries.sort_by_key(|(entry, _)| std::cmp::Reverse(entry.last_used()));

        let now = Timestamp::now();
        let max_age_ms = max_age.map(|age| i64::try_from(age.as_millis()).unwrap_or(i64::MAX));
        let mut kept_bytes = 0u64;

        for (entry, size) in entries {
            let age_ms = now.as_millisecond() - entry.last_used().as_millisecond();
            let too_old = max_age_ms.is_some_and(|max| age_ms > max);
            let over_budget = max_bytes.is_some_and(|max| kept_bytes + size > max);

            if too_old || over_budget {
                let path = entry.path();
                if self.invalidate(&path).await? {
                    tracing::debug!(%path, too_old, over_budget, "expired");
                    report.removed += 1;
                    report.freed_bytes += size;
                }
            } else {
                kept_bytes += size;
                report.remaining += 1;
            }
        }

        report.freed_bytes += self.remove_orphans().await?;
        report.remaining_bytes = kept_bytes;
        Ok(report)
    }

    /// Remove content files that have no snapshot
    async fn remove_orphans(&self) -> Result<u64> {
        let mut freed = 0;
        let mut dir = match tokio::fs::read_dir(self.layout.data_dir()).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let has_meta = tokio::fs::try_exists(self.layout.meta_dir().join(item.file_name()))
                .await
                .unwrap_or(true);
            if !has_meta {
                freed += file_size(&item.path()).await;
                remove_if_exists(&item.path()).await?;
            }
        }
        Ok(freed)
    }
}

fn cache_write(path: &Path, source: std::io::Error) -> Error {
    Error::CacheWrite {
        path: path.display().to_string(),
        source,
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0)
}

async fn clear_dir(dir: &Path) -> Result<u64> {
    let mut freed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    while let Some(item) = entries.next_entry().await? {
        freed += file_size(&item.path()).await;
        if let Err(e) = remove_if_exists(&item.path()).await {
            tracing::warn!(file = ?item.path(), error = %e, "couldn't delete temp file");
        }
    }
    Ok(freed)
}
