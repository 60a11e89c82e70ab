use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ComputeError, Result};

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Content-addressed blob store reached through a pinning API and a read gateway.
pub struct PinningContentStore {
    client: Client,
    pin_url: String,
    pin_token: Option<String>,
    gateway_url: String,
}

impl PinningContentStore {
    pub fn new(
        pin_url: &str,
        pin_token: Option<String>,
        gateway_url: &str,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            pin_url: pin_url.to_string(),
            pin_token,
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn pin(&self, value: &Value) -> Result<String> {
        let mut request = self
            .client
            .post(&self.pin_url)
            .json(&serde_json::json!({ "pinataContent": value }));
        if let Some(token) = self.pin_token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::from_status(status, &body));
        }
        let pinned: PinResponse = response.json().await?;
        tracing::debug!(
            event = "compute.content.pinned",
            content_ref = %pinned.ipfs_hash,
            "blob pinned"
        );
        Ok(pinned.ipfs_hash)
    }

    pub async fn retrieve(&self, content_ref: &str) -> Result<Value> {
        let url = format!("{}/{content_ref}", self.gateway_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::from_status(status, &body));
        }
        Ok(response.json().await?)
    }
}
