//! Store health check

use anyhow::Result;

use crate::KeyValueStore;

const PROBE_KEY: &str = "beacon-health-probe";

/// Verify the store accepts a write, returns it, and deletes it.
pub async fn check_health(store: &dyn KeyValueStore) -> Result<()> {
    let token = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .to_string();

    store
        .set(PROBE_KEY, token.clone())
        .await
        .map_err(|e| anyhow::anyhow!("store health check failed (write): {e}"))?;
    let read = store
        .get(PROBE_KEY)
        .await
        .map_err(|e| anyhow::anyhow!("store health check failed (read): {e}"))?;
    store
        .remove(PROBE_KEY)
        .await
        .map_err(|e| anyhow::anyhow!("store health check failed (remove): {e}"))?;

    if read.as_deref() != Some(token.as_str()) {
        anyhow::bail!("store health check failed: probe value mismatch");
    }
    Ok(())
}
