//! Drain passes and the background task that triggers them.
//!
//! A pass snapshots the queue, attempts each action once in FIFO order with
//! no queue lock held across remote calls, then commits all outcomes in one
//! step, matching by id so that actions enqueued or cleared mid-pass are
//! respected. Only one pass runs at a time; a trigger that finds one running
//! is dropped.

use beacon_core::ActionId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{AbandonReason, DrainReport, QueueEvent};
use crate::queue::Inner;

/// What started a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTrigger {
    Timer,
    Reconnect,
    Forced,
}

impl fmt::Display for DrainTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DrainTrigger::Timer => "timer",
            DrainTrigger::Reconnect => "reconnect",
            DrainTrigger::Forced => "forced",
        })
    }
}

enum Outcome {
    Remove,
    Retry(u32),
}

/// Run one drain pass. Returns `None` when nothing ran: offline, shut down,
/// another pass in progress, or an empty queue.
pub(crate) async fn drain(inner: &Inner, trigger: DrainTrigger) -> Option<DrainReport> {
    if inner.is_shut_down() {
        return None;
    }
    if !inner.connectivity.is_online() {
        debug!(%trigger, "offline, skipping drain");
        return None;
    }
    let Ok(_guard) = inner.drain_guard.try_lock() else {
        debug!(%trigger, "drain already in progress, trigger coalesced");
        return None;
    };

    let snapshot = inner.actions.lock().await.clone();
    if snapshot.is_empty() {
        debug!(%trigger, "queue empty, nothing to drain");
        return None;
    }
    info!(%trigger, pending = snapshot.len(), "draining offline queue");

    let mut report = DrainReport::default();
    let mut outcomes: HashMap<ActionId, Outcome> = HashMap::new();

    for mut action in snapshot {
        if !inner.connectivity.is_online() {
            info!(%trigger, "connectivity lost mid-drain, deferring the rest");
            break;
        }
        if !inner.contains(&action.id).await {
            debug!(id = %action.id, "action cleared mid-drain, skipping");
            continue;
        }

        let kind = action.kind();
        report.attempted += 1;
        match inner.executor.execute(&action).await {
            Ok(()) => {
                report.succeeded += 1;
                debug!(id = %action.id, %kind, attempt = action.retry_count + 1, "action executed");
                inner.emit(QueueEvent::Executed {
                    id: action.id.clone(),
                    kind,
                    attempt: action.retry_count + 1,
                });
                outcomes.insert(action.id, Outcome::Remove);
            }
            Err(e) if !e.is_retryable() => {
                report.abandoned += 1;
                error!(id = %action.id, %kind, error = %e, "action cannot be executed, dropping it");
                inner.emit(QueueEvent::Abandoned {
                    id: action.id.clone(),
                    kind,
                    reason: AbandonReason::NoHandler,
                });
                outcomes.insert(action.id, Outcome::Remove);
            }
            Err(e) => {
                let exhausted = action.record_failure();
                inner.emit(QueueEvent::AttemptFailed {
                    id: action.id.clone(),
                    kind,
                    retry_count: action.retry_count,
                    max_retries: action.max_retries,
                    error: format!("{e:#}"),
                });
                if exhausted {
                    report.abandoned += 1;
                    warn!(
                        id = %action.id,
                        %kind,
                        retries = action.retry_count,
                        error = %format!("{e:#}"),
                        "retries exhausted, dropping action"
                    );
                    inner.emit(QueueEvent::Abandoned {
                        id: action.id.clone(),
                        kind,
                        reason: AbandonReason::RetriesExhausted,
                    });
                    outcomes.insert(action.id, Outcome::Remove);
                } else {
                    report.failed += 1;
                    warn!(
                        id = %action.id,
                        %kind,
                        retry_count = action.retry_count,
                        max_retries = action.max_retries,
                        error = %format!("{e:#}"),
                        "action failed, will retry"
                    );
                    outcomes.insert(action.id, Outcome::Retry(action.retry_count));
                }
            }
        }
    }

    report.remaining = {
        let mut live = inner.actions.lock().await;
        live.retain_mut(|a| match outcomes.get(&a.id) {
            Some(Outcome::Remove) => false,
            Some(Outcome::Retry(count)) => {
                a.retry_count = *count;
                true
            }
            None => true,
        });
        inner.persist(&live).await;
        live.len()
    };

    info!(
        %trigger,
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failed,
        abandoned = report.abandoned,
        remaining = report.remaining,
        "drain finished"
    );
    inner.emit(QueueEvent::DrainFinished(report));
    Some(report)
}

/// Start the background task: periodic drains while online, an immediate
/// drain whenever connectivity comes back. The periodic timer restarts
/// from each reconnect drain.
pub(crate) fn spawn(inner: Arc<Inner>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    let mut online_rx = inner.connectivity.subscribe();
    let mut online = *online_rx.borrow_and_update();

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(period_secs = period.as_secs_f64(), online, "sync scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // A wake-up that reads online covers a flap the
                    // watch collapsed: offline and back since we last looked.
                    online = *online_rx.borrow_and_update();
                    if online {
                        run(&inner, DrainTrigger::Reconnect, &cancel).await;
                        ticker.reset();
                    }
                }
                _ = ticker.tick(), if online => {
                    run(&inner, DrainTrigger::Timer, &cancel).await;
                }
            }
        }
        debug!("sync scheduler stopped");
    })
}

async fn run(inner: &Inner, trigger: DrainTrigger, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            warn!(%trigger, "scheduler cancelled mid-drain, uncommitted outcomes will replay");
        }
        _ = drain(inner, trigger) => {}
    }
}
