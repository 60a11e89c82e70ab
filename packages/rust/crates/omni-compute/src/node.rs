//! Node-direct surface of the ephemeral host executing a job.
//!
//! Both calls carry a signed auth header. A 4xx answer clears the cached
//! signature and retries exactly once with a freshly produced header.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde_json::Value;

use crate::auth::AuthProvider;
use crate::error::{ComputeError, Result, truncate_body};

/// Default HTTPS endpoint of a node, `{node}` is replaced by the node identifier.
pub const DEFAULT_NODE_HTTP_URL_TEMPLATE: &str = "https://{node}.node.k8s.prd.nos.ci";
/// Default websocket endpoint of a node.
pub const DEFAULT_NODE_WS_URL_TEMPLATE: &str = "wss://{node}.node.k8s.prd.nos.ci";

/// URL templates for reaching a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoints {
    pub http_url_template: String,
    pub ws_url_template: String,
}

impl Default for NodeEndpoints {
    fn default() -> Self {
        Self {
            http_url_template: DEFAULT_NODE_HTTP_URL_TEMPLATE.to_string(),
            ws_url_template: DEFAULT_NODE_WS_URL_TEMPLATE.to_string(),
        }
    }
}

impl NodeEndpoints {
    pub fn http_url(&self, node: &str) -> String {
        self.http_url_template
            .replace("{node}", node)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn ws_url(&self, node: &str) -> String {
        self.ws_url_template
            .replace("{node}", node)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Authenticated client for node-direct job endpoints.
pub struct NodeClient {
    client: Client,
    endpoints: NodeEndpoints,
    auth: Arc<AuthProvider>,
}

impl NodeClient {
    pub fn new(endpoints: NodeEndpoints, auth: Arc<AuthProvider>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoints,
            auth,
        }
    }

    /// Push the real job definition to the node running `job_address`.
    pub async fn push_job_definition(
        &self,
        node: &str,
        job_address: &str,
        definition: &Value,
    ) -> Result<()> {
        let url = format!(
            "{}/job/{job_address}/job-definition",
            self.endpoints.http_url(node)
        );
        self.send_authenticated(Method::POST, &url, Some(definition))
            .await?;
        tracing::info!(
            event = "compute.node.definition_pushed",
            node,
            job_address,
            "confidential job definition delivered to node"
        );
        Ok(())
    }

    /// Fetch job results straight from the node.
    pub async fn fetch_results(&self, node: &str, job_address: &str) -> Result<Value> {
        let url = format!("{}/job/{job_address}/results", self.endpoints.http_url(node));
        let response = self.send_authenticated(Method::GET, &url, None).await?;
        Ok(response.json().await?)
    }

    async fn send_authenticated(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        match self.send_once(method.clone(), url, body).await {
            Err(ComputeError::NodeRejected { status, body: rejected }) => {
                tracing::warn!(
                    event = "compute.node.rejected_retrying",
                    url,
                    status,
                    body = %rejected,
                    "node rejected request; clearing auth cache and retrying once"
                );
                self.auth.clear_cache();
                self.send_once(method, url, body).await
            }
            other => other,
        }
    }

    async fn send_once(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Response> {
        let auth = self.auth.produce().await?;
        let mut request = self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, auth.header_value);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(ComputeError::NodeRejected {
                status: status.as_u16(),
                body: truncate_body(&text, 512),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ComputeError::from_status(status, &text));
        }
        Ok(response)
    }
}
