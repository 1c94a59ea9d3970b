//! `OfflineQueue`: the facade the rest of the application talks to.
//!
//! One instance per session, created with `init` at the composition root and
//! stopped with `teardown`. Clones share the same queue.

use beacon_core::config::QueueConfig;
use beacon_core::{ActionId, ActionPayload, PendingAction, DEFAULT_MAX_RETRIES};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::connectivity::ConnectivityMonitor;
use crate::events::QueueEvent;
use crate::executor::Executor;
use crate::scheduler::{self, DrainTrigger};
use crate::state::QueueStore;

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Periodic drain interval while online
    pub sync_interval: Duration,
    /// Retry budget used by `enqueue`
    pub default_max_retries: u32,
    /// Upper bound on the attempt made inside `enqueue`. When it elapses the
    /// action stays queued for the scheduler.
    pub enqueue_attempt_timeout: Duration,
    /// Broadcast buffer for `QueueEvent`s
    pub event_capacity: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            sync_interval: Duration::from_secs(30),
            default_max_retries: DEFAULT_MAX_RETRIES,
            enqueue_attempt_timeout: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

impl From<&QueueConfig> for QueueOptions {
    fn from(config: &QueueConfig) -> Self {
        QueueOptions {
            sync_interval: Duration::from_secs(config.sync_interval_secs.max(1)),
            default_max_retries: config.default_max_retries,
            enqueue_attempt_timeout: Duration::from_secs(config.enqueue_attempt_timeout_secs.max(1)),
            ..QueueOptions::default()
        }
    }
}

/// State shared by the facade and the scheduler task.
pub(crate) struct Inner {
    pub(crate) actions: Mutex<Vec<PendingAction>>,
    pub(crate) store: QueueStore,
    pub(crate) executor: Executor,
    pub(crate) connectivity: ConnectivityMonitor,
    /// Held for the whole of a drain pass or an immediate attempt
    pub(crate) drain_guard: Mutex<()>,
    pub(crate) attempt_timeout: Duration,
    pub(crate) events: broadcast::Sender<QueueEvent>,
    pub(crate) shutdown: CancellationToken,
}

impl Inner {
    pub(crate) fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) async fn contains(&self, id: &ActionId) -> bool {
        self.actions.lock().await.iter().any(|a| &a.id == id)
    }

    /// Write `actions` through to the store. Callers hold the queue lock so
    /// the persisted order always matches memory. Failures are logged only;
    /// the in-memory queue stays authoritative until the next persist.
    pub(crate) async fn persist(&self, actions: &[PendingAction]) {
        if let Err(e) = self.store.save(actions).await {
            error!(error = %format!("{e:#}"), pending = actions.len(), "failed to persist offline queue");
        }
    }

    /// One attempt right after enqueue. Skipped if a drain holds the guard;
    /// that drain or the next one will pick the action up.
    async fn attempt_now(&self, action: &PendingAction) {
        let Ok(_guard) = self.drain_guard.try_lock() else {
            debug!(id = %action.id, "drain in progress, leaving action for the scheduler");
            return;
        };

        let attempt = tokio::time::timeout(self.attempt_timeout, self.executor.execute(action));
        match attempt.await {
            Ok(Ok(())) => {
                let mut live = self.actions.lock().await;
                live.retain(|a| a.id != action.id);
                self.persist(&live).await;
                drop(live);
                debug!(id = %action.id, kind = %action.kind(), "action executed on enqueue");
                self.emit(QueueEvent::Executed {
                    id: action.id.clone(),
                    kind: action.kind(),
                    attempt: 1,
                });
            }
            Ok(Err(e)) => {
                debug!(
                    id = %action.id,
                    kind = %action.kind(),
                    error = %format!("{e:#}"),
                    "immediate attempt failed, action stays queued"
                );
            }
            Err(_) => {
                debug!(
                    id = %action.id,
                    kind = %action.kind(),
                    timeout_secs = self.attempt_timeout.as_secs_f64(),
                    "immediate attempt still running, leaving action for the scheduler"
                );
            }
        }
    }
}

struct SchedulerHandle {
    shutdown: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Durable, retry-bounded queue of pending remote mutations.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<Inner>,
    scheduler: Arc<SchedulerHandle>,
    default_max_retries: u32,
}

impl OfflineQueue {
    /// Load the persisted queue (fail soft) and start the scheduler.
    ///
    /// Must be called inside a Tokio runtime. The first periodic drain runs
    /// one `sync_interval` after start; a connectivity transition to online
    /// drains immediately.
    pub async fn init(
        options: QueueOptions,
        store: QueueStore,
        executor: Executor,
        connectivity: ConnectivityMonitor,
    ) -> OfflineQueue {
        let actions = store.load().await;
        info!(
            key = store.key(),
            pending = actions.len(),
            online = connectivity.is_online(),
            sync_interval_secs = options.sync_interval.as_secs_f64(),
            action_timeout = ?executor.timeout(),
            "offline queue initialised"
        );

        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let shutdown = CancellationToken::new();
        let inner = Arc::new(Inner {
            actions: Mutex::new(actions),
            store,
            executor,
            connectivity,
            drain_guard: Mutex::new(()),
            attempt_timeout: options.enqueue_attempt_timeout,
            events,
            shutdown: shutdown.clone(),
        });

        let task = scheduler::spawn(inner.clone(), options.sync_interval, shutdown.clone());
        OfflineQueue {
            inner,
            scheduler: Arc::new(SchedulerHandle {
                shutdown,
                task: std::sync::Mutex::new(Some(task)),
            }),
            default_max_retries: options.default_max_retries,
        }
    }

    /// Queue `payload` with the default retry budget.
    pub async fn enqueue(&self, payload: ActionPayload) -> ActionId {
        self.enqueue_with_retries(payload, self.default_max_retries)
            .await
    }

    /// Queue `payload`. Never fails: the action is appended and persisted
    /// (a persist failure is logged and the action kept in memory), then
    /// attempted once right away if online. The wait on that attempt is
    /// bounded by `enqueue_attempt_timeout`.
    pub async fn enqueue_with_retries(&self, payload: ActionPayload, max_retries: u32) -> ActionId {
        let action = PendingAction::new(payload, max_retries);
        let id = action.id.clone();
        let kind = action.kind();

        let pending = {
            let mut live = self.inner.actions.lock().await;
            live.push(action.clone());
            self.inner.persist(&live).await;
            live.len()
        };
        info!(id = %id, %kind, max_retries = action.max_retries, pending, "action enqueued");
        self.inner.emit(QueueEvent::Enqueued {
            id: id.clone(),
            kind,
        });

        if self.inner.connectivity.is_online() && !self.inner.is_shut_down() {
            self.inner.attempt_now(&action).await;
        }
        id
    }

    /// Drain now, exactly as the scheduler would. No-op when offline or when
    /// a drain is already running.
    pub async fn force_sync(&self) {
        scheduler::drain(&self.inner, DrainTrigger::Forced).await;
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.actions.lock().await.len()
    }

    /// Snapshot of the queue in FIFO order.
    pub async fn list_pending(&self) -> Vec<PendingAction> {
        self.inner.actions.lock().await.clone()
    }

    /// Drop every pending action, of every kind, and persist the empty queue.
    /// Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let dropped = {
            let mut live = self.inner.actions.lock().await;
            let dropped = live.len();
            live.clear();
            self.inner.persist(&live).await;
            dropped
        };
        info!(dropped, "offline queue cleared");
        self.inner.emit(QueueEvent::Cleared { dropped });
        dropped
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    /// Stop the scheduler and wait for it to exit. Idempotent. The queue
    /// stays readable and `enqueue` still persists, but nothing executes.
    pub async fn teardown(&self) {
        self.scheduler.shutdown.cancel();
        let task = self
            .scheduler
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "sync scheduler task failed");
            }
            info!("offline queue torn down");
        }
    }
}
