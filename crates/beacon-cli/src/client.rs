//! Thin HTTP client for the beacond local API.

use anyhow::{Context, Result};
use beacon_core::config::BeaconConfig;
use beacon_core::PendingAction;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct DaemonStatus {
    pub online: bool,
    pub pending: usize,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct SyncOutcome {
    pub online: bool,
    pub pending: usize,
    /// False when beacond answered before the drain completed
    pub finished: bool,
}

#[derive(Debug, Deserialize)]
struct Cleared {
    cleared: usize,
}

pub struct DaemonClient {
    http: reqwest::Client,
    base: String,
}

impl DaemonClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building HTTP client")?;
        Ok(DaemonClient {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn status(&self) -> Result<DaemonStatus> {
        self.call(self.http.get(self.url("/v1/status"))).await
    }

    pub async fn list(&self) -> Result<Vec<PendingAction>> {
        self.call(self.http.get(self.url("/v1/actions"))).await
    }

    /// Returns how many actions were dropped.
    pub async fn clear(&self) -> Result<usize> {
        let cleared: Cleared = self.call(self.http.delete(self.url("/v1/actions"))).await?;
        Ok(cleared.cleared)
    }

    pub async fn sync(&self) -> Result<SyncOutcome> {
        self.call(self.http.post(self.url("/v1/sync"))).await
    }

    pub async fn config(&self) -> Result<BeaconConfig> {
        self.call(self.http.get(self.url("/v1/config"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("connecting to beacond at {}", self.base))?;
        let status = resp.status();
        if !status.is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let detail = body["error"].as_str().unwrap_or("no detail");
            anyhow::bail!("beacond returned HTTP {status}: {detail}");
        }
        resp.json().await.context("decoding beacond response")
    }
}
