//! Queue lifecycle events for in-process observers (metrics, the local API).
//!
//! Events are fire-and-forget on a broadcast channel. A lagging subscriber
//! loses events; the queue never waits on one. Nothing here is persisted.

use beacon_core::{ActionId, ActionKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    Enqueued {
        id: ActionId,
        kind: ActionKind,
    },
    /// The remote call succeeded; `attempt` counts from 1.
    Executed {
        id: ActionId,
        kind: ActionKind,
        attempt: u32,
    },
    /// A drain attempt failed and the action stays queued.
    AttemptFailed {
        id: ActionId,
        kind: ActionKind,
        retry_count: u32,
        max_retries: u32,
        error: String,
    },
    /// The action was dropped without succeeding.
    Abandoned {
        id: ActionId,
        kind: ActionKind,
        reason: AbandonReason,
    },
    DrainFinished(DrainReport),
    Cleared {
        dropped: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    RetriesExhausted,
    NoHandler,
}

impl AbandonReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbandonReason::RetriesExhausted => "retries_exhausted",
            AbandonReason::NoHandler => "no_handler",
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed attempts that stay queued
    pub failed: usize,
    pub abandoned: usize,
    /// Queue length after the commit
    pub remaining: usize,
}
