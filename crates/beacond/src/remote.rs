//! HTTP handlers: one JSON POST per action kind against the backend API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use beacon_core::config::BackendConfig;
use beacon_core::{ActionKind, ActionPayload};
use beacon_sync::{ActionHandler, Executor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    location_path: String,
    incident_path: String,
    message_path: String,
}

impl RemoteClient {
    /// Build a client from `[backend]`, reading the bearer token from the
    /// environment variable named by `token_env`.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            warn!(
                env = %config.token_env,
                "no API token in environment, backend requests will be unauthenticated"
            );
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("building HTTP client")?;

        Ok(RemoteClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            location_path: config.location_path.clone(),
            incident_path: config.incident_path.clone(),
            message_path: config.message_path.clone(),
        })
    }

    fn endpoint(&self, kind: ActionKind) -> String {
        let path = match kind {
            ActionKind::LocationUpdate => &self.location_path,
            ActionKind::IncidentCreate => &self.incident_path,
            ActionKind::MessageSend => &self.message_path,
        };
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST the payload body to its kind's endpoint. Any non-2xx is a failure.
    pub async fn submit(&self, payload: &ActionPayload) -> Result<()> {
        let url = self.endpoint(payload.kind());
        let mut request = self.http.post(&url).json(&payload.body());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("POST {url}: HTTP {status}: {}", text.trim());
        }
        debug!(url = %url, status = status.as_u16(), "backend accepted action");
        Ok(())
    }

    /// An executor routing every action kind to this client.
    pub fn into_executor(self, timeout: Option<Duration>) -> Executor {
        let shared: Arc<dyn ActionHandler> = Arc::new(self);
        ActionKind::ALL
            .into_iter()
            .fold(Executor::builder(), |builder, kind| {
                builder.shared_handler(kind, shared.clone())
            })
            .timeout(timeout)
            .build()
    }
}

#[async_trait]
impl ActionHandler for RemoteClient {
    async fn execute(&self, payload: &ActionPayload) -> anyhow::Result<()> {
        self.submit(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{IncidentReport, IncidentSeverity, LocationPing};
    use chrono::Utc;
    use mockito::Matcher;

    fn backend(url: &str, token_env: &str) -> BackendConfig {
        BackendConfig {
            base_url: format!("{url}/"),
            token_env: token_env.into(),
            request_timeout_secs: 5,
            ..BackendConfig::default()
        }
    }

    fn ping() -> ActionPayload {
        ActionPayload::LocationUpdate(LocationPing {
            guard_id: "guard-42".into(),
            latitude: 52.52,
            longitude: 13.405,
            accuracy_m: None,
            recorded_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn posts_payload_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/locations")
            .match_header("authorization", "Bearer field-token")
            .match_body(Matcher::PartialJson(serde_json::json!({"guard_id": "guard-42"})))
            .with_status(201)
            .create_async()
            .await;

        std::env::set_var("BEACON_TEST_TOKEN_OK", "field-token");
        let client = RemoteClient::from_config(&backend(&server.url(), "BEACON_TEST_TOKEN_OK")).unwrap();
        client.submit(&ping()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/incidents")
            .with_status(422)
            .with_body("site_id unknown")
            .create_async()
            .await;

        let client =
            RemoteClient::from_config(&backend(&server.url(), "BEACON_TEST_TOKEN_UNSET")).unwrap();
        let err = client
            .submit(&ActionPayload::IncidentCreate(IncidentReport {
                site_id: "nowhere".into(),
                title: "t".into(),
                description: "d".into(),
                severity: IncidentSeverity::Low,
                latitude: None,
                longitude: None,
                reported_at: Utc::now(),
            }))
            .await
            .unwrap_err();

        let msg = format!("{err:#}");
        assert!(msg.contains("422"), "{msg}");
        assert!(msg.contains("site_id unknown"), "{msg}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_failure() {
        let client = RemoteClient::from_config(&backend("http://127.0.0.1:9", "BEACON_TEST_TOKEN_UNSET")).unwrap();
        assert!(client.submit(&ping()).await.is_err());
    }

    #[tokio::test]
    async fn executor_routes_every_kind() {
        let client = RemoteClient::from_config(&BackendConfig::default()).unwrap();
        let executor = client.into_executor(None);
        for kind in ActionKind::ALL {
            assert!(executor.has_handler(kind));
        }
    }
}
