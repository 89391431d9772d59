//! Storage namespace for live blobs.
//!
//! Every live blob is one entry keyed by [`BlobId::storage_key`]. Ids are
//! unique, so two in-flight operations never touch the same key and no
//! per-key locking is needed.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::allocator::BlobId;
use crate::error::Error;

/// Keyed persistence for blob content.
///
/// There is deliberately no read or list operation: the service only ever
/// writes a blob once and deletes it once.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Stores `content` under `id`. Returns once the entry is complete and
    /// visible to readers of the namespace.
    async fn put(&self, id: BlobId, content: Bytes) -> io::Result<()>;

    /// Removes the entry for `id`. A missing entry is an error.
    async fn remove(&self, id: BlobId) -> io::Result<()>;
}

// ── Filesystem ───────────────────────────────────────────────────────────────

/// A directory with one file per live blob, named by the decimal id and
/// holding the published bytes verbatim.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Opens `root`, creating it (and its parents) if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| Error::Storage { path: root.clone(), source })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for `id`.
    pub fn path_for(&self, id: BlobId) -> PathBuf {
        self.root.join(id.storage_key())
    }

    // Dot-prefixed so it can never collide with a decimal entry name.
    fn staging_path(&self, id: BlobId) -> PathBuf {
        self.root.join(format!(".{id}.partial"))
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn put(&self, id: BlobId, content: Bytes) -> io::Result<()> {
        let staging = self.staging_path(id);

        // Write aside, then rename: readers see either no entry or the whole
        // content, never a prefix of it.
        if let Err(e) = write_synced(&staging, &content).await {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                debug!(%id, error = %cleanup, "staging file cleanup failed");
            }
            return Err(e);
        }
        fs::rename(&staging, self.path_for(id)).await
    }

    async fn remove(&self, id: BlobId) -> io::Result<()> {
        fs::remove_file(self.path_for(id)).await
    }
}

async fn write_synced(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(content).await?;
    // tokio buffers file writes in the background; sync_all waits for them.
    file.sync_all().await
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// A process-local store. Content disappears with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<BlobId, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: BlobId) -> Option<Bytes> {
        self.entries().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<BlobId, Bytes>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, id: BlobId, content: Bytes) -> io::Result<()> {
        self.entries().insert(id, content);
        Ok(())
    }

    async fn remove(&self, id: BlobId) -> io::Result<()> {
        match self.entries().remove(&id) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("no blob {id}"))),
        }
    }
}
