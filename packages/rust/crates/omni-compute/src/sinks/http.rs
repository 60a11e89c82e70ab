use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{ComputeError, Result};

use super::{AuditEvent, AuditSink, HeartbeatSink, InventoryHeartbeat};

const INTERNAL_API_KEY_HEADER: &str = "X-Internal-Api-Key";

fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .unwrap_or_default()
}

/// Posts heartbeats to the orchestrator inventory endpoint.
pub struct HttpHeartbeatSink {
    client: Client,
    url: String,
}

impl HttpHeartbeatSink {
    pub fn new(orchestrator_url: &str, timeout_secs: u64) -> Self {
        Self {
            client: build_client(timeout_secs),
            url: format!(
                "{}/inventory/heartbeat",
                orchestrator_url.trim_end_matches('/')
            ),
        }
    }
}

#[async_trait]
impl HeartbeatSink for HttpHeartbeatSink {
    async fn send_heartbeat(&self, heartbeat: &InventoryHeartbeat) -> Result<()> {
        let response = self.client.post(&self.url).json(heartbeat).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::from_status(status, &body));
        }
        Ok(())
    }
}

/// Posts audit events to the internal audit endpoint.
pub struct HttpAuditSink {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpAuditSink {
    pub fn new(audit_url: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            client: build_client(timeout_secs),
            url: format!("{}/audit/internal/log", audit_url.trim_end_matches('/')),
            api_key,
        }
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let mut request = self.client.post(&self.url).json(event);
        if let Some(api_key) = self.api_key.as_deref() {
            request = request.header(INTERNAL_API_KEY_HEADER, api_key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::from_status(status, &body));
        }
        Ok(())
    }
}
