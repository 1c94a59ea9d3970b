//! Local action API used by the field app and the `beacon` CLI.
//!
//! Routes:
//!   POST   /v1/actions  enqueue `{kind, payload, max_retries?}`
//!   GET    /v1/actions  pending actions, FIFO order
//!   DELETE /v1/actions  clear the queue
//!   GET    /v1/status   online flag + pending count
//!   POST   /v1/sync     force a drain, wait for it (bounded), report status
//!   GET    /v1/config   effective daemon configuration

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_core::config::BeaconConfig;
use beacon_core::{ActionId, ActionKind, ActionPayload, BeaconError, PendingAction};
use beacon_sync::OfflineQueue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ApiState {
    pub queue: OfflineQueue,
    pub config: Arc<BeaconConfig>,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub kind: ActionKind,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub id: ActionId,
    pub pending: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub online: bool,
    pub pending: usize,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(flatten)]
    pub status: StatusResponse,
    /// False when the drain outlived `daemon.sync_wait_secs` and is still
    /// running in the background
    pub finished: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

/// Error body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(StatusCode, anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": format!("{:#}", self.1) });
        (self.0, Json(body)).into_response()
    }
}

impl From<BeaconError> for ApiError {
    fn from(err: BeaconError) -> Self {
        let status = match err {
            BeaconError::InvalidRecord(_) | BeaconError::Json(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, err.into())
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/v1/actions",
            post(enqueue_handler)
                .get(list_handler)
                .delete(clear_handler),
        )
        .route("/v1/status", get(status_handler))
        .route("/v1/sync", post(sync_handler))
        .route("/v1/config", get(config_handler))
        .with_state(state)
}

pub async fn serve(addr: String, state: ApiState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("api bind {addr}"))?;

    info!(addr = %addr, "api: listening on /v1");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("api server")
}

async fn enqueue_handler(
    State(state): State<ApiState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let payload = ActionPayload::from_parts(req.kind, req.payload)?;
    let id = match req.max_retries {
        Some(max_retries) => state.queue.enqueue_with_retries(payload, max_retries).await,
        None => state.queue.enqueue(payload).await,
    };
    let pending = state.queue.pending_count().await;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { id, pending })))
}

async fn list_handler(State(state): State<ApiState>) -> Json<Vec<PendingAction>> {
    Json(state.queue.list_pending().await)
}

async fn clear_handler(State(state): State<ApiState>) -> Json<ClearResponse> {
    let cleared = state.queue.clear().await;
    Json(ClearResponse { cleared })
}

async fn status(state: &ApiState) -> StatusResponse {
    StatusResponse {
        online: state.queue.connectivity().is_online(),
        pending: state.queue.pending_count().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

async fn status_handler(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(status(&state).await)
}

async fn sync_handler(State(state): State<ApiState>) -> (StatusCode, Json<SyncResponse>) {
    let queue = state.queue.clone();
    let drain = tokio::spawn(async move { queue.force_sync().await });
    let wait = Duration::from_secs(state.config.daemon.sync_wait_secs);

    let finished = match tokio::time::timeout(wait, drain).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "forced drain task failed");
            true
        }
        Err(_) => {
            info!(wait_secs = wait.as_secs(), "forced drain still running, answering early");
            false
        }
    };
    let code = if finished {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    let body = SyncResponse {
        status: status(&state).await,
        finished,
    };
    (code, Json(body))
}

async fn config_handler(State(state): State<ApiState>) -> Json<BeaconConfig> {
    Json(state.config.as_ref().clone())
}
