//! Durable queue state: the full ordered action list stored under one key.
//!
//! `load` fails soft. A missing, unreadable, or corrupt value yields an empty
//! queue and a warning, so a bad write can never brick the queue. `save`
//! rewrites the whole list; atomicity comes from the backend's `set`.

use anyhow::{Context, Result};
use beacon_core::PendingAction;
use beacon_store::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_KEY: &str = "offline_queue";

/// Loads and saves the offline queue through a `KeyValueStore`.
#[derive(Clone)]
pub struct QueueStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl QueueStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        QueueStore {
            kv,
            key: key.into(),
        }
    }

    /// Store under the default `offline_queue` key.
    pub fn with_default_key(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::new(kv, DEFAULT_QUEUE_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted queue. Never fails; see module docs.
    pub async fn load(&self) -> Vec<PendingAction> {
        let content = match self.kv.get(&self.key).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!(key = %self.key, "no persisted queue, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(key = %self.key, error = %format!("{e:#}"), "reading persisted queue failed, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<PendingAction>>(&content) {
            Ok(actions) => {
                debug!(key = %self.key, count = actions.len(), "persisted queue loaded");
                actions
            }
            Err(e) => {
                warn!(
                    key = %self.key,
                    error = %e,
                    bytes = content.len(),
                    "persisted queue is corrupt, discarding it and starting empty"
                );
                Vec::new()
            }
        }
    }

    /// Overwrite the persisted queue with `actions`.
    pub async fn save(&self, actions: &[PendingAction]) -> Result<()> {
        let json = serde_json::to_string(actions).context("serializing offline queue")?;
        self.kv
            .set(&self.key, json)
            .await
            .with_context(|| format!("persisting offline queue under key {}", self.key))
    }
}
