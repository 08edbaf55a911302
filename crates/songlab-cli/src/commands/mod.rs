//! CLI command implementations.

pub mod analyze;
pub mod jobs;
pub mod songs;

use anyhow::Result;
use serde_json::Value;

/// GET a JSON document, failing on any non-2xx response.
pub(crate) async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("request failed: HTTP {status} - {body}");
    }
    Ok(resp.json().await?)
}
