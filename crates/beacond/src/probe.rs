//! Connectivity probe: periodically GETs a URL and feeds the result into the
//! `ConnectivityMonitor`.
//!
//! Any HTTP response below 500 counts as online. A transport error, a
//! timeout, or a 5xx counts as offline.

use anyhow::{Context, Result};
use beacon_core::config::{BackendConfig, ConnectivityConfig};
use beacon_sync::ConnectivityMonitor;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Probe {
    http: reqwest::Client,
    url: String,
    every: Duration,
}

impl Probe {
    pub fn from_config(config: &ConnectivityConfig, backend: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs.max(1)))
            .build()
            .context("building probe HTTP client")?;
        Ok(Probe {
            http,
            url: config.resolved_probe_url(backend),
            every: Duration::from_secs(config.probe_interval_secs.max(1)),
        })
    }

    /// One probe. Never fails; unreachable is just `false`.
    pub async fn check(&self) -> bool {
        match self.http.get(&self.url).send().await {
            Ok(resp) => {
                let online = !resp.status().is_server_error();
                debug!(url = %self.url, status = resp.status().as_u16(), online, "probe");
                online
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "probe failed");
                false
            }
        }
    }

    /// Probe immediately, then every interval, until `cancel` fires.
    pub async fn run(self, monitor: ConnectivityMonitor, cancel: CancellationToken) {
        info!(url = %self.url, every_secs = self.every.as_secs(), "connectivity probe started");
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let online = tokio::select! {
                        _ = cancel.cancelled() => break,
                        online = self.check() => online,
                    };
                    monitor.set_online(online);
                }
            }
        }
        debug!("connectivity probe stopped");
    }
}
