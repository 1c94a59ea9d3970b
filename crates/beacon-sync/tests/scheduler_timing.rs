//! Timer-driven behaviour, run on a paused clock so ticks are deterministic.

mod common;

use beacon_core::ActionKind;
use beacon_store::MemoryStore;
use beacon_sync::{handler_fn, Executor};
use common::{go_online, location, message, open_with, Backend};
use std::time::Duration;
use tokio::time::sleep;

const PERIOD: Duration = Duration::from_secs(30);

#[tokio::test(start_paused = true)]
async fn periodic_drain_retries_until_dropped() {
    let kv = MemoryStore::new();
    let backend = Backend::failing();
    let queue = open_with(&kv, backend.executor(), true, PERIOD).await;

    queue.enqueue_with_retries(location("guard-5"), 3).await;
    assert_eq!(backend.call_count(), 1, "immediate attempt on enqueue");
    assert_eq!(queue.list_pending().await[0].retry_count, 0);

    sleep(Duration::from_secs(29)).await;
    assert_eq!(backend.call_count(), 1, "no tick before the first period");

    sleep(Duration::from_secs(2)).await;
    assert_eq!(backend.call_count(), 2);
    assert_eq!(queue.list_pending().await[0].retry_count, 1);

    sleep(PERIOD * 2).await;
    assert_eq!(backend.call_count(), 4);
    assert_eq!(queue.pending_count().await, 0);

    sleep(PERIOD * 10).await;
    assert_eq!(backend.call_count(), 4);
    queue.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn offline_suspends_the_timer() {
    let kv = MemoryStore::new();
    let backend = Backend::succeeding();
    let queue = open_with(&kv, backend.executor(), false, PERIOD).await;

    queue.enqueue(message("queued in the basement")).await;
    sleep(Duration::from_secs(3600)).await;
    queue.force_sync().await;

    assert_eq!(backend.call_count(), 0);
    assert_eq!(queue.pending_count().await, 1);
    queue.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn going_offline_stops_periodic_drains() {
    let kv = MemoryStore::new();
    let backend = Backend::failing();
    let queue = open_with(&kv, backend.executor(), true, PERIOD).await;

    queue.enqueue_with_retries(location("guard-8"), 10).await;
    sleep(PERIOD + Duration::from_secs(1)).await;
    assert_eq!(backend.call_count(), 2);

    queue.connectivity().set_online(false);
    sleep(PERIOD * 10).await;
    assert_eq!(backend.call_count(), 2);
    queue.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_drains_immediately_and_restarts_the_timer() {
    let kv = MemoryStore::new();
    let backend = Backend::failing();
    let queue = open_with(&kv, backend.executor(), false, PERIOD).await;

    queue.enqueue_with_retries(location("guard-2"), 10).await;
    sleep(Duration::from_secs(100)).await;

    go_online(&queue).await;
    assert_eq!(backend.call_count(), 1);

    sleep(Duration::from_secs(29)).await;
    assert_eq!(backend.call_count(), 1, "timer restarts from the reconnect drain");

    sleep(Duration::from_secs(2)).await;
    assert_eq!(backend.call_count(), 2);
    queue.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_the_timer() {
    let kv = MemoryStore::new();
    let backend = Backend::failing();
    let queue = open_with(&kv, backend.executor(), true, PERIOD).await;

    queue.enqueue_with_retries(message("logout pending"), 10).await;
    queue.teardown().await;
    sleep(PERIOD * 5).await;

    assert_eq!(backend.call_count(), 1);
    assert_eq!(queue.pending_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn hung_remote_call_times_out_as_a_failure() {
    let kv = MemoryStore::new();
    let executor = Executor::builder()
        .handler(
            ActionKind::MessageSend,
            handler_fn(|_| async {
                sleep(Duration::from_secs(86_400)).await;
                Ok(())
            }),
        )
        .timeout(Some(Duration::from_secs(10)))
        .build();
    let queue = open_with(&kv, executor, false, Duration::from_secs(3600)).await;

    queue.enqueue(message("stuck")).await;
    let report = go_online(&queue).await;

    assert_eq!(report.failed, 1);
    assert_eq!(queue.list_pending().await[0].retry_count, 1);
    queue.teardown().await;
}
