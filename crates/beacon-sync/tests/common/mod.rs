//! Shared fixtures for the beacon-sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use beacon_core::{
    ActionKind, ActionPayload, ChatMessage, IncidentReport, IncidentSeverity, LocationPing,
};
use beacon_store::MemoryStore;
use beacon_sync::{
    ActionHandler, ConnectivityMonitor, DrainReport, Executor, OfflineQueue, QueueEvent,
    QueueOptions, QueueStore,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Fake backend: records every call by label and fails on request.
#[derive(Clone, Default)]
pub struct Backend {
    calls: Arc<Mutex<Vec<String>>>,
    failures_left: Arc<Mutex<HashMap<String, u32>>>,
    always_fail: bool,
}

impl Backend {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Backend {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Fail the first `n` calls for `label`, then succeed.
    pub fn flaky(self, label: &str, n: u32) -> Self {
        self.failures_left
            .lock()
            .unwrap()
            .insert(label.to_string(), n);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn executor(&self) -> Executor {
        let shared: Arc<dyn ActionHandler> = Arc::new(self.clone());
        ActionKind::ALL
            .into_iter()
            .fold(Executor::builder(), |b, kind| {
                b.shared_handler(kind, shared.clone())
            })
            .build()
    }
}

#[async_trait]
impl ActionHandler for Backend {
    async fn execute(&self, payload: &ActionPayload) -> anyhow::Result<()> {
        let label = label(payload);
        self.calls.lock().unwrap().push(label.clone());
        if self.always_fail {
            anyhow::bail!("HTTP 503 for {label}");
        }
        let mut left = self.failures_left.lock().unwrap();
        if let Some(n) = left.get_mut(&label) {
            if *n > 0 {
                *n -= 1;
                anyhow::bail!("HTTP 502 for {label}");
            }
        }
        Ok(())
    }
}

/// The human-readable field of each payload, used as the call label.
pub fn label(payload: &ActionPayload) -> String {
    match payload {
        ActionPayload::LocationUpdate(p) => p.guard_id.clone(),
        ActionPayload::IncidentCreate(p) => p.title.clone(),
        ActionPayload::MessageSend(p) => p.body.clone(),
    }
}

pub fn location(guard_id: &str) -> ActionPayload {
    ActionPayload::LocationUpdate(LocationPing {
        guard_id: guard_id.into(),
        latitude: 34.0522,
        longitude: -118.2437,
        accuracy_m: Some(8.0),
        recorded_at: Utc::now(),
    })
}

pub fn incident(title: &str) -> ActionPayload {
    ActionPayload::IncidentCreate(IncidentReport {
        site_id: "site-1".into(),
        title: title.into(),
        description: "observed during patrol".into(),
        severity: IncidentSeverity::High,
        latitude: Some(34.05),
        longitude: Some(-118.24),
        reported_at: Utc::now(),
    })
}

pub fn message(body: &str) -> ActionPayload {
    ActionPayload::MessageSend(ChatMessage {
        conversation_id: "dispatch".into(),
        sender_id: "guard-3".into(),
        body: body.into(),
        sent_at: Utc::now(),
    })
}

/// Open a queue over `kv` that starts offline and never ticks on its own
/// within a test.
pub async fn open_offline(kv: &MemoryStore, executor: Executor) -> OfflineQueue {
    open_with(kv, executor, false, Duration::from_secs(3600)).await
}

pub async fn open_with(
    kv: &MemoryStore,
    executor: Executor,
    online: bool,
    sync_interval: Duration,
) -> OfflineQueue {
    OfflineQueue::init(
        QueueOptions {
            sync_interval,
            ..QueueOptions::default()
        },
        QueueStore::with_default_key(Arc::new(kv.clone())),
        executor,
        ConnectivityMonitor::new(online),
    )
    .await
}

/// Flip the queue's monitor online and wait for the reconnect drain.
pub async fn go_online(queue: &OfflineQueue) -> DrainReport {
    let mut events = queue.subscribe_events();
    assert!(queue.connectivity().set_online(true));
    wait_for_drain(&mut events).await
}

pub async fn wait_for_drain(events: &mut broadcast::Receiver<QueueEvent>) -> DrainReport {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            match events.recv().await {
                Ok(QueueEvent::DrainFinished(report)) => return report,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("drain did not finish")
}
