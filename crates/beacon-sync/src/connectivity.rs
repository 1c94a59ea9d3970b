//! Binary online/offline signal.
//!
//! The embedding application feeds observations in with `set_online`; the
//! queue reads snapshots with `is_online` and reacts to transitions through
//! `subscribe`. Repeating the current state is not a transition and wakes
//! nobody.
//!
//! `subscribe` hands out a `watch` receiver, which only keeps the latest
//! state: a flap that reverts before the receiver looks reads as "changed"
//! with an unchanged value. `on_change` is fed from a separate transition
//! log so it sees every flip.

use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const TRANSITION_LOG_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
    transitions: broadcast::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        let (transitions, _) = broadcast::channel(TRANSITION_LOG_CAPACITY);
        ConnectivityMonitor {
            tx: Arc::new(tx),
            transitions,
        }
    }

    /// Point-in-time snapshot.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the latest observation. Returns true if it was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "connectivity changed");
            let _ = self.transitions.send(online);
        }
        changed
    }

    /// Receiver that wakes after any transition. Only the latest state is
    /// readable, so a wake-up whose value matches the last one seen means
    /// the signal flipped and came back.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Run `callback(new_state)` once per transition until the monitor is dropped.
    pub fn on_change<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(bool) + Send + 'static,
    {
        let mut rx = self.transitions.subscribe();
        let state = self.tx.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(online) => callback(online),
                    Err(RecvError::Lagged(missed)) => {
                        // Catch up with the current state rather than replay.
                        warn!(missed, "connectivity callback lagged behind transitions");
                        callback(*state.borrow());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn snapshot_follows_updates() {
        let monitor = ConnectivityMonitor::new(false);
        assert!(!monitor.is_online());
        assert!(monitor.set_online(true));
        assert!(monitor.is_online());
    }

    #[test]
    fn repeated_state_is_not_a_transition() {
        let monitor = ConnectivityMonitor::new(true);
        let rx = monitor.subscribe();
        assert!(!monitor.set_online(true));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn subscriber_sees_transition() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();
        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn on_change_fires_once_per_transition() {
        let monitor = ConnectivityMonitor::new(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let task = monitor.on_change(move |online| sink.lock().unwrap().push(online));

        for state in [true, true, false, false, true] {
            monitor.set_online(state);
            tokio::task::yield_now().await;
        }
        drop(monitor);
        task.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![true, false, true]);
    }

    #[tokio::test]
    async fn on_change_sees_a_flap_that_reverts_before_it_runs() {
        let monitor = ConnectivityMonitor::new(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let task = monitor.on_change(move |online| sink.lock().unwrap().push(online));

        // No yield between the two: the callback task has not run yet.
        assert!(monitor.set_online(false));
        assert!(monitor.set_online(true));
        drop(monitor);
        task.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn watch_subscriber_wakes_after_a_flap() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        monitor.set_online(true);

        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
