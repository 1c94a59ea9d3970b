//! Daemon lifecycle: open the store, start the queue, probe, API and metrics,
//! then wait for SIGTERM/SIGINT and tear everything down.

use anyhow::{Context, Result};
use beacon_core::config::{expand_tilde, BeaconConfig};
use beacon_sync::{ConnectivityMonitor, OfflineQueue, QueueOptions, QueueStore};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{self, ApiState};
use crate::metrics::{self, HealthState, QueueMetrics};
use crate::probe::Probe;
use crate::remote::RemoteClient;

pub async fn run(config: BeaconConfig) -> Result<()> {
    info!("daemon starting");

    // ── Durable store ────────────────────────────────────────────────────
    let store_path = expand_tilde(&config.queue.store_path);
    let kv = beacon_store::open_store(&store_path)
        .with_context(|| format!("opening queue store at {}", store_path.display()))?;
    match beacon_store::check_health(kv.as_ref()).await {
        Ok(()) => info!(path = %store_path.display(), "queue store: ready"),
        Err(e) => warn!(path = %store_path.display(), "queue store: {e:#}"),
    }

    // ── Queue ────────────────────────────────────────────────────────────
    let monitor = ConnectivityMonitor::new(config.connectivity.assume_online);
    let executor = RemoteClient::from_config(&config.backend)?
        .into_executor(config.queue.action_timeout_secs.map(Duration::from_secs));
    let queue = OfflineQueue::init(
        QueueOptions::from(&config.queue),
        QueueStore::new(kv.clone(), config.queue.store_key.clone()),
        executor,
        monitor.clone(),
    )
    .await;

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    // ── Connectivity probe ───────────────────────────────────────────────
    let probe = Probe::from_config(&config.connectivity, &config.backend)?;
    tasks.spawn(probe.run(monitor.clone(), cancel.clone()));

    // ── Metrics ──────────────────────────────────────────────────────────
    let mut registry = Registry::default();
    let queue_metrics = QueueMetrics::new(&mut registry);
    tasks.spawn(metrics::record(
        queue_metrics,
        queue.clone(),
        monitor.clone(),
        cancel.clone(),
    ));
    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let state = HealthState {
            registry: Arc::new(registry),
            store: kv.clone(),
        };
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = metrics::serve(addr, state, cancel).await {
                error!("metrics server failed: {e:#}");
            }
        });
    }

    // ── Local API ────────────────────────────────────────────────────────
    let api_state = ApiState {
        queue: queue.clone(),
        config: Arc::new(config.clone()),
    };
    let listen = config.daemon.listen.clone();
    let api_cancel = cancel.clone();
    let mut api_task = tokio::spawn(api::serve(listen, api_state, api_cancel));

    notify_ready();

    // Wait for SIGTERM or SIGINT, or for the API server to die
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let api_result = tokio::select! {
        _ = sigterm.recv() => { info!("received SIGTERM"); None }
        _ = sigint.recv() => { info!("received SIGINT"); None }
        res = &mut api_task => Some(res),
    };

    cancel.cancel();
    queue.teardown().await;
    while tasks.join_next().await.is_some() {}

    let api_result = match api_result {
        Some(res) => res,
        None => api_task.await,
    };
    match api_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(e) => return Err(anyhow::anyhow!("api task panicked: {e}")),
    }

    info!(
        pending = queue.pending_count().await,
        "daemon stopped, pending actions stay queued for next start"
    );
    Ok(())
}

fn notify_ready() {
    // Send sd_notify(READY=1) to systemd if running as a service
    // Uses $NOTIFY_SOCKET env var; no-op if not set
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}
