use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::auth::{MessageSigningService, SignedMessage};
use crate::error::{ComputeError, Result};

use super::content_store::PinningContentStore;
use super::{CreditBalance, ExtendReceipt, JobSnapshot, Marketplace, PostedJob, StopReceipt};

/// Marketplace client over the delegated HTTP API (bearer API key).
///
/// Also acts as the remote signing service for delegated auth.
pub struct DelegatedApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    content_store: PinningContentStore,
}

impl DelegatedApiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        content_store: PinningContentStore,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            content_store,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, route: &str, request: RequestBuilder) -> Result<T> {
        let started = Instant::now();
        let response = match request.bearer_auth(&self.api_key).send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(
                    event = "compute.api.request_failed",
                    route,
                    elapsed_ms = started.elapsed().as_millis(),
                    error = %error,
                    "delegated api request failed"
                );
                return Err(error.into());
            }
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(
                event = "compute.api.non_success_status",
                route,
                status = %status,
                elapsed_ms = started.elapsed().as_millis(),
                "delegated api returned non-success status"
            );
            return Err(ComputeError::from_status(status, &body));
        }
        let value: T = response.json().await?;
        tracing::trace!(
            event = "compute.api.completed",
            route,
            elapsed_ms = started.elapsed().as_millis(),
            "delegated api request completed"
        );
        Ok(value)
    }
}

#[async_trait]
impl Marketplace for DelegatedApiClient {
    async fn post_job(&self, content_ref: &str, market: &str) -> Result<PostedJob> {
        let request = self
            .client
            .post(self.url("/jobs/list"))
            .json(&json!({ "contentRef": content_ref, "market": market }));
        self.send("jobs.list", request).await
    }

    async fn resolve_deployment(&self, handle: &str) -> Result<Option<String>> {
        let request = self.client.get(self.url(&format!("/deployments/{handle}")));
        let value: Value = self.send("deployments.get", request).await?;
        Ok(value
            .get("job")
            .and_then(Value::as_str)
            .filter(|job| !job.is_empty())
            .map(str::to_string))
    }

    async fn get_job(&self, address: &str) -> Result<JobSnapshot> {
        let request = self.client.get(self.url(&format!("/jobs/{address}")));
        self.send("jobs.get", request).await
    }

    async fn stop_job(&self, address: &str) -> Result<StopReceipt> {
        let request = self.client.post(self.url(&format!("/jobs/{address}/stop")));
        self.send("jobs.stop", request).await
    }

    async fn extend_job(&self, address: &str, seconds: u64) -> Result<ExtendReceipt> {
        let request = self
            .client
            .post(self.url(&format!("/jobs/{address}/extend")))
            .json(&json!({ "seconds": seconds }));
        self.send("jobs.extend", request).await
    }

    async fn pin_blob(&self, value: &Value) -> Result<String> {
        self.content_store.pin(value).await
    }

    async fn retrieve_blob(&self, content_ref: &str) -> Result<Value> {
        self.content_store.retrieve(content_ref).await
    }

    async fn credit_balance(&self) -> Result<CreditBalance> {
        let request = self.client.get(self.url("/credits/balance"));
        self.send("credits.balance", request).await
    }
}

#[async_trait]
impl MessageSigningService for DelegatedApiClient {
    async fn sign_message(&self, message: &str) -> Result<SignedMessage> {
        let request = self
            .client
            .post(self.url("/auth/sign-message/external"))
            .json(&json!({ "message": message }));
        self.send("auth.sign_message", request).await
    }
}
