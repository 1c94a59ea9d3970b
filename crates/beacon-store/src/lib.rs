//! beacon-store: durable key-value storage behind a small async interface.
//!
//! The offline queue keeps its whole state under one key, so backends only
//! need whole-value `get`/`set`/`remove`. Every backend guarantees that a
//! `set` is atomic with respect to a later `get`: readers see either the old
//! value or the new one, never a partial write.

pub mod file;
pub mod health;
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use file::FileStore;
pub use health::check_health;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

/// Durable string-valued key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }
}

/// Open the appropriate backend for `path`.
///
/// Paths ending in `.rocksdb` use RocksDB (if compiled with the `rocksdb`
/// feature); everything else is a `FileStore` directory.
pub fn open_store(path: &Path) -> Result<Arc<dyn KeyValueStore>> {
    let is_rocks = path
        .extension()
        .map(|ext| ext == "rocksdb")
        .unwrap_or(false);

    #[cfg(feature = "rocksdb")]
    if is_rocks {
        return Ok(Arc::new(RocksStore::open(path)?));
    }

    #[cfg(not(feature = "rocksdb"))]
    if is_rocks {
        tracing::warn!(
            path = %path.display(),
            "RocksDB not compiled in (missing 'rocksdb' feature), falling back to file store"
        );
    }

    Ok(Arc::new(FileStore::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_store_defaults_to_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("store")).unwrap();

        store.set("k", "v".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(dir.path().join("store").join("k.json").exists());
    }

    #[cfg(not(feature = "rocksdb"))]
    #[tokio::test]
    async fn rocksdb_path_falls_back_without_feature() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("queue.rocksdb")).unwrap();
        store.set("k", "v".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
