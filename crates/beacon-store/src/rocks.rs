//! RocksDB-backed store. Writes go straight to RocksDB; its WAL provides
//! durability and single-key puts are atomic.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

use crate::KeyValueStore;

pub struct RocksStore {
    db: rocksdb::DB,
}

impl RocksStore {
    /// Open or create a RocksDB store at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);

        let db = rocksdb::DB::open(&opts, db_path)
            .with_context(|| format!("opening RocksDB: {}", db_path.display()))?;
        Ok(RocksStore { db })
    }
}

#[async_trait]
impl KeyValueStore for RocksStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .get(key.as_bytes())
            .with_context(|| format!("RocksDB get: {key}"))?;
        value
            .map(|bytes| String::from_utf8(bytes).with_context(|| format!("RocksDB value not UTF-8: {key}")))
            .transpose()
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.db
            .put(key.as_bytes(), value.as_bytes())
            .with_context(|| format!("RocksDB put: {key}"))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db
            .delete(key.as_bytes())
            .with_context(|| format!("RocksDB delete: {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persistence_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("queue.rocksdb");

        {
            let store = RocksStore::open(&db_path).expect("open");
            store.set("offline_queue", "[]".into()).await.unwrap();
        }

        let store = RocksStore::open(&db_path).expect("reopen");
        assert_eq!(
            store.get("offline_queue").await.unwrap().as_deref(),
            Some("[]")
        );
        store.remove("offline_queue").await.unwrap();
        assert!(store.get("offline_queue").await.unwrap().is_none());
    }
}
