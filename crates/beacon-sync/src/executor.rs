//! Action registry and executor.
//!
//! The embedding application registers one handler per `ActionKind`; the
//! executor looks the handler up by the action's kind and makes exactly one
//! attempt. Transport (REST, anything else) lives entirely in the handlers.
//!
//! Every handler failure is the same retryable failure. The only
//! non-retryable outcome is a missing handler, which is a wiring bug.

use async_trait::async_trait;
use beacon_core::{ActionKind, ActionPayload, PendingAction};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Performs the remote call for one kind of action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, payload: &ActionPayload) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an `ActionHandler`.
pub struct FnHandler<F>(F);

/// Wrap `f` as a handler. The payload is passed by value (cloned per attempt).
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(ActionPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(ActionPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn execute(&self, payload: &ActionPayload) -> anyhow::Result<()> {
        (self.0)(payload.clone()).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("no handler registered for action kind {0}")]
    NoHandler(ActionKind),

    #[error("remote call timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Failed(anyhow::Error),
}

impl ExecuteError {
    /// Whether the action should stay queued for another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExecuteError::NoHandler(_))
    }
}

/// Kind → handler registry. Cheap to clone.
#[derive(Clone)]
pub struct Executor {
    handlers: Arc<HashMap<ActionKind, Arc<dyn ActionHandler>>>,
    timeout: Option<Duration>,
}

impl Executor {
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    pub fn has_handler(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Make one attempt at `action`.
    pub async fn execute(&self, action: &PendingAction) -> Result<(), ExecuteError> {
        let kind = action.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(ExecuteError::NoHandler(kind))?;

        let attempt = handler.execute(&action.payload);
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(result) => result.map_err(ExecuteError::Failed),
                Err(_) => Err(ExecuteError::TimedOut(limit)),
            },
            None => attempt.await.map_err(ExecuteError::Failed),
        }
    }
}

#[derive(Default)]
pub struct ExecutorBuilder {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
    timeout: Option<Duration>,
}

impl ExecutorBuilder {
    /// Register `handler` for `kind`, replacing any earlier registration.
    pub fn handler(self, kind: ActionKind, handler: impl ActionHandler + 'static) -> Self {
        self.shared_handler(kind, Arc::new(handler))
    }

    /// Register an already shared handler (one client serving several kinds).
    pub fn shared_handler(mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Bound each attempt; `None` lets a remote call run indefinitely.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Executor {
        Executor {
            handlers: Arc::new(self.handlers),
            timeout: self.timeout,
        }
    }
}
