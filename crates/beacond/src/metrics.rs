//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  Prometheus text format
//!   GET /healthz  Liveness probe (always 200 if process is running)
//!   GET /readyz   Readiness probe (200 if the queue store accepts writes)
//!
//! Queue metrics are fed from `QueueEvent`s by a recorder task.

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use beacon_core::ActionKind;
use beacon_store::KeyValueStore;
use beacon_sync::{ConnectivityMonitor, OfflineQueue, QueueEvent};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type Labels = Vec<(String, String)>;

#[derive(Clone)]
pub struct QueueMetrics {
    enqueued: Family<Labels, Counter>,
    executed: Family<Labels, Counter>,
    attempts_failed: Family<Labels, Counter>,
    abandoned: Family<Labels, Counter>,
    drains: Counter,
    pending: Gauge,
    online: Gauge,
}

impl QueueMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = QueueMetrics {
            enqueued: Family::default(),
            executed: Family::default(),
            attempts_failed: Family::default(),
            abandoned: Family::default(),
            drains: Counter::default(),
            pending: Gauge::default(),
            online: Gauge::default(),
        };

        registry.register(
            "beacon_actions_enqueued",
            "Actions appended to the offline queue",
            metrics.enqueued.clone(),
        );
        registry.register(
            "beacon_actions_executed",
            "Actions accepted by the backend",
            metrics.executed.clone(),
        );
        registry.register(
            "beacon_action_attempts_failed",
            "Failed drain attempts (action kept or dropped)",
            metrics.attempts_failed.clone(),
        );
        registry.register(
            "beacon_actions_abandoned",
            "Actions dropped without succeeding",
            metrics.abandoned.clone(),
        );
        registry.register(
            "beacon_drain_passes",
            "Completed drain passes",
            metrics.drains.clone(),
        );
        registry.register(
            "beacon_queue_pending",
            "Actions currently queued",
            metrics.pending.clone(),
        );
        registry.register(
            "beacon_connectivity_online",
            "1 while the backend is reachable",
            metrics.online.clone(),
        );

        metrics
    }

    fn kind_labels(kind: &ActionKind) -> Labels {
        vec![("kind".to_string(), kind.as_str().to_string())]
    }

    pub fn observe(&self, event: &QueueEvent) {
        match event {
            QueueEvent::Enqueued { kind, .. } => {
                self.enqueued.get_or_create(&Self::kind_labels(kind)).inc();
            }
            QueueEvent::Executed { kind, .. } => {
                self.executed.get_or_create(&Self::kind_labels(kind)).inc();
            }
            QueueEvent::AttemptFailed { kind, .. } => {
                self.attempts_failed
                    .get_or_create(&Self::kind_labels(kind))
                    .inc();
            }
            QueueEvent::Abandoned { kind, reason, .. } => {
                let mut labels = Self::kind_labels(kind);
                labels.push(("reason".to_string(), reason.as_str().to_string()));
                self.abandoned.get_or_create(&labels).inc();
            }
            QueueEvent::DrainFinished(report) => {
                self.drains.inc();
                self.pending.set(report.remaining as i64);
            }
            QueueEvent::Cleared { .. } => {
                self.pending.set(0);
            }
        }
    }

    pub fn set_pending(&self, pending: usize) {
        self.pending.set(pending as i64);
    }

    pub fn set_online(&self, online: bool) {
        self.online.set(i64::from(online));
    }
}

/// Feed queue events and connectivity changes into `metrics` until cancelled.
pub async fn record(
    metrics: QueueMetrics,
    queue: OfflineQueue,
    monitor: ConnectivityMonitor,
    cancel: CancellationToken,
) {
    let mut events = queue.subscribe_events();
    let online_gauge = metrics.clone();
    let transitions = monitor.on_change(move |online| online_gauge.set_online(online));
    metrics.set_online(monitor.is_online());
    metrics.set_pending(queue.pending_count().await);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    metrics.observe(&event);
                    if matches!(event, QueueEvent::Enqueued { .. } | QueueEvent::Executed { .. }) {
                        metrics.set_pending(queue.pending_count().await);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "metrics recorder lagged behind queue events");
                    metrics.set_pending(queue.pending_count().await);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    transitions.abort();
    debug!("metrics recorder stopped");
}

/// Shared health state updated by the daemon
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn KeyValueStore>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9470")
pub async fn serve(addr: String, state: HealthState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("metrics bind {addr}"))?;

    info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("metrics server")
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness probe: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe: returns 200 if the queue store is writable, 503 otherwise.
async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match beacon_store::check_health(state.store.as_ref()).await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use beacon_core::ActionId;
    use beacon_store::MemoryStore;
    use beacon_sync::{AbandonReason, DrainReport};
    use tower::ServiceExt;

    fn metrics() -> (QueueMetrics, Arc<Registry>) {
        let mut registry = Registry::default();
        let metrics = QueueMetrics::new(&mut registry);
        (metrics, Arc::new(registry))
    }

    fn encoded(registry: &Registry) -> String {
        let mut body = String::new();
        encode(&mut body, registry).unwrap();
        body
    }

    #[test]
    fn events_update_counters_by_kind() {
        let (metrics, registry) = metrics();
        let id = ActionId::from("a-1");

        metrics.observe(&QueueEvent::Executed {
            id: id.clone(),
            kind: ActionKind::LocationUpdate,
            attempt: 1,
        });
        metrics.observe(&QueueEvent::Abandoned {
            id,
            kind: ActionKind::MessageSend,
            reason: AbandonReason::RetriesExhausted,
        });
        metrics.observe(&QueueEvent::DrainFinished(DrainReport {
            attempted: 2,
            succeeded: 1,
            failed: 0,
            abandoned: 1,
            remaining: 4,
        }));

        let text = encoded(&registry);
        assert!(text.contains(r#"beacon_actions_executed_total{kind="location_update"} 1"#), "{text}");
        assert!(
            text.contains(r#"beacon_actions_abandoned_total{kind="message_send",reason="retries_exhausted"} 1"#),
            "{text}"
        );
        assert!(text.contains("beacon_queue_pending 4"), "{text}");
        assert!(text.contains("beacon_drain_passes_total 1"), "{text}");
    }

    #[test]
    fn clear_resets_pending() {
        let (metrics, registry) = metrics();
        metrics.set_pending(9);
        metrics.observe(&QueueEvent::Cleared { dropped: 9 });
        assert!(encoded(&registry).contains("beacon_queue_pending 0"));
    }

    #[tokio::test]
    async fn recorder_tracks_connectivity_and_queue_events() {
        use beacon_sync::{Executor, QueueOptions, QueueStore};

        let (metrics, registry) = metrics();
        let monitor = ConnectivityMonitor::new(false);
        let queue = OfflineQueue::init(
            QueueOptions::default(),
            QueueStore::with_default_key(Arc::new(MemoryStore::new())),
            Executor::builder().build(),
            monitor.clone(),
        )
        .await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(record(metrics, queue.clone(), monitor.clone(), cancel.clone()));
        tokio::task::yield_now().await;

        monitor.set_online(true);
        monitor.set_online(false);
        queue.connectivity().set_online(true);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let text = encoded(&registry);
        assert!(text.contains("beacon_connectivity_online 1"), "{text}");
        assert!(text.contains("beacon_queue_pending 0"), "{text}");

        cancel.cancel();
        task.await.unwrap();
        queue.teardown().await;
    }

    #[tokio::test]
    async fn endpoints_respond() {
        let (_metrics, registry) = metrics();
        let store = MemoryStore::new();
        let app = router(HealthState {
            registry,
            store: Arc::new(store.clone()),
        });

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("beacon_queue_pending"));

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        store.fail_writes(true);
        let resp = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
