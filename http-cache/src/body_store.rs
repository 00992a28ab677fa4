use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use pipeline::Body;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Byte-addressable blob storage, indexed by secondary key.
///
/// Both implementations support concurrent reads; writes to the same key
/// are serialized by the store itself (a second writer waits for the first
/// to finish, then its bytes win).
#[async_trait]
pub trait BodyStore: Send + Sync {
    /// Write `body` under `key`, fully draining it, returning the number of
    /// bytes written. On failure the partial blob must not be left behind.
    async fn write(&self, key: Uuid, body: Body) -> io::Result<u64>;

    /// Read the blob stored under `key`, if any.
    async fn read(&self, key: Uuid) -> io::Result<Option<Body>>;

    /// Remove the blob stored under `key`, if any. Not an error if absent.
    async fn delete(&self, key: Uuid) -> io::Result<()>;

    /// Remove every stored blob.
    async fn clear(&self) -> io::Result<()>;

    /// List every key currently holding a blob, used by the journal at
    /// startup to reconcile orphan and missing blobs against its entries.
    async fn list_keys(&self) -> io::Result<Vec<Uuid>>;
}

/// Process-scoped, in-memory body store.
#[derive(Debug, Default)]
pub struct MemoryBodyStore {
    blobs: RwLock<HashMap<Uuid, Bytes>>,
}

impl MemoryBodyStore {
    /// Construct an empty in-memory body store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BodyStore for MemoryBodyStore {
    async fn write(&self, key: Uuid, body: Body) -> io::Result<u64> {
        let bytes = body.into_bytes().await.map_err(|e| io::Error::other(e.to_string()))?;
        let len = bytes.len() as u64;
        self.blobs.write().await.insert(key, bytes);
        Ok(len)
    }

    async fn read(&self, key: Uuid) -> io::Result<Option<Body>> {
        Ok(self.blobs.read().await.get(&key).cloned().map(Body::from))
    }

    async fn delete(&self, key: Uuid) -> io::Result<()> {
        self.blobs.write().await.remove(&key);
        Ok(())
    }

    async fn clear(&self) -> io::Result<()> {
        self.blobs.write().await.clear();
        Ok(())
    }

    async fn list_keys(&self) -> io::Result<Vec<Uuid>> {
        Ok(self.blobs.read().await.keys().copied().collect())
    }
}

/// Local-filesystem body store, rooted at a configured directory. One file
/// per secondary key; filenames are hyphenated UUID strings, so no
/// user-controlled path segment ever reaches the filesystem.
pub struct FsBodyStore {
    root: PathBuf,
    // Serializes writers to the same key; a `Mutex<()>` keyed map is enough
    // since the actual byte transfer still happens outside the lock scope
    // boundary for distinct keys.
    write_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl FsBodyStore {
    /// Root the store at `directory`, creating it if necessary.
    pub async fn new(directory: impl AsRef<Path>) -> io::Result<Self> {
        let root = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root, write_locks: Mutex::new(HashMap::new()) })
    }

    fn path_for(&self, key: Uuid) -> PathBuf {
        self.root.join(key.to_string())
    }

    async fn lock_for(&self, key: Uuid) -> Arc<Mutex<()>> {
        self.write_locks.lock().await.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[async_trait]
impl BodyStore for FsBodyStore {
    async fn write(&self, key: Uuid, body: Body) -> io::Result<u64> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let final_path = self.path_for(key);
        let temp_path = self.root.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&temp_path).await?;
        let mut stream = body.into_stream();
        let mut written: u64 = 0;
        let write_result: io::Result<()> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| io::Error::other(e.to_string()))?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await
        }
        .await;

        match write_result {
            Ok(()) => {
                drop(file);
                tokio::fs::rename(&temp_path, &final_path).await?;
                Ok(written)
            }
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn read(&self, key: Uuid) -> io::Result<Option<Body>> {
        let path = self.path_for(key);
        match tokio::fs::File::open(&path).await {
            Ok(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).await?;
                Ok(Some(Body::from(buf)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: Uuid) -> io::Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn clear(&self) -> io::Result<()> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let _ = tokio::fs::remove_file(entry.path()).await;
        }
        Ok(())
    }

    async fn list_keys(&self) -> io::Result<Vec<Uuid>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(key) = Uuid::parse_str(name) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}
