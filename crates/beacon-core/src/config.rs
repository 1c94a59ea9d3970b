use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from beacon.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub daemon: DaemonConfig,
    pub queue: QueueConfig,
    pub backend: BackendConfig,
    pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Local action API listen address (default: 127.0.0.1:8470)
    pub listen: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9470)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// How long `POST /v1/sync` waits for its drain before answering; the
    /// drain itself keeps running
    pub sync_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Durable store location. A directory for the file backend, or a
    /// `*.rocksdb` path when built with the `rocksdb` feature.
    pub store_path: PathBuf,
    /// Key holding the serialized queue
    pub store_key: String,
    /// Retry budget for actions enqueued without an explicit one
    pub default_max_retries: u32,
    /// Periodic drain interval while online
    pub sync_interval_secs: u64,
    /// Optional per-action timeout; unset means a remote call may take as long as it takes
    pub action_timeout_secs: Option<u64>,
    /// How long `enqueue` waits on its immediate attempt
    pub enqueue_attempt_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Field-operations API base URL
    pub base_url: String,
    /// Name of the environment variable holding the bearer token
    pub token_env: String,
    /// HTTP request timeout for remote handlers
    pub request_timeout_secs: u64,
    pub location_path: String,
    pub incident_path: String,
    pub message_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// URL probed to decide online/offline (default: `{backend.base_url}/health`)
    pub probe_url: Option<String>,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    /// Start in the online state before the first probe completes
    pub assume_online: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8470".into(),
            metrics_addr: Some("127.0.0.1:9470".into()),
            log_level: "info".into(),
            log_format: "text".into(),
            sync_wait_secs: 30,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("~/.local/share/beacon/store"),
            store_key: "offline_queue".into(),
            default_max_retries: crate::types::DEFAULT_MAX_RETRIES,
            sync_interval_secs: 30,
            action_timeout_secs: None,
            enqueue_attempt_timeout_secs: 10,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            token_env: "BEACON_API_TOKEN".into(),
            request_timeout_secs: 15,
            location_path: "/api/locations".into(),
            incident_path: "/api/incidents".into(),
            message_path: "/api/messages".into(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            probe_interval_secs: 10,
            probe_timeout_secs: 5,
            assume_online: false,
        }
    }
}

impl ConnectivityConfig {
    /// Resolve the probe URL, falling back to the backend health endpoint.
    pub fn resolved_probe_url(&self, backend: &BackendConfig) -> String {
        self.probe_url
            .clone()
            .unwrap_or_else(|| format!("{}/health", backend.base_url.trim_end_matches('/')))
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_tilde(path: &std::path::Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}
