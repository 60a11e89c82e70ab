//! Shared types for the lifecycle controller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthProvider;
use crate::handoff::{DEFAULT_SERVICE_DOMAIN, HandoffConfig};
use crate::marketplace::Marketplace;
use crate::node::NodeClient;
use crate::retry::RetryPolicy;
use crate::sinks::{AuditSink, DEFAULT_MAX_IN_FLIGHT_SIDE_CALLS, HeartbeatSink};

use super::WatchRegistry;

/// Resources a job holds, as reported to the orchestrator inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub gpu: u32,
    pub vcpu: u32,
    pub ram_gb: u32,
}

/// One supervised job. Lives in the [`WatchRegistry`] keyed by `job_address`.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedJob {
    pub job_address: String,
    pub deployment_handle: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_extend_time: DateTime<Utc>,
    /// Full definition, including confidential operational fields.
    pub definition: Value,
    pub market: String,
    pub confidential: bool,
    pub resources: ResourceProfile,
    /// Set once by `stop`; never reset.
    pub user_stopped: bool,
    /// First resolved exposed-service URL.
    pub service_url: Option<String>,
}

impl WatchedJob {
    pub fn new(
        job_address: &str,
        definition: Value,
        market: &str,
        confidential: bool,
        resources: ResourceProfile,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_address: job_address.to_string(),
            deployment_handle: None,
            start_time: now,
            last_extend_time: now,
            definition,
            market: market.to_string(),
            confidential,
            resources,
            user_stopped: false,
            service_url: None,
        }
    }

    /// Whether a replacement job can be posted from what we hold.
    pub fn is_redeployable(&self) -> bool {
        !self.market.trim().is_empty()
            && self
                .definition
                .as_object()
                .is_some_and(|definition| !definition.is_empty())
    }
}

/// Input for `launch`.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub definition: Value,
    pub market: String,
    pub confidential: bool,
    pub resources: ResourceProfile,
}

/// Success payload of `launch`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchOutcome {
    pub job_address: String,
    pub tx: Option<String>,
    pub credits: Option<Value>,
    /// Reference of the publicly pinned blob (placeholder when confidential).
    pub content_ref: String,
    pub deployment_handle: Option<String>,
}

/// Summary of a startup recovery scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Whether the marketplace could list all jobs.
    pub listing_supported: bool,
    /// Jobs adopted from the marketplace listing.
    pub recovered: usize,
    /// In-memory registry entries whose watch was re-armed.
    pub rearmed: usize,
}

/// Collaborators injected into the controller.
pub struct ControllerDeps {
    pub marketplace: Arc<dyn Marketplace>,
    pub auth: Arc<AuthProvider>,
    pub node_client: Arc<NodeClient>,
    pub heartbeat_sink: Arc<dyn HeartbeatSink>,
    pub audit_sink: Arc<dyn AuditSink>,
    pub registry: WatchRegistry,
}

/// Watch cadence and lifecycle policy.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Provider label sent with inventory heartbeats.
    pub provider: String,
    /// Outer watch tick.
    pub tick_interval: Duration,
    /// Minimum spacing of `ready` heartbeats.
    pub heartbeat_interval: Duration,
    /// Extend when the remaining lease is at or below this.
    pub extend_threshold_secs: u64,
    /// Lease extension applied per auto-extend.
    pub extend_by_secs: u64,
    /// Terminations before this runtime are treated as failures, never redeployed.
    pub min_runtime_for_redeploy_secs: u64,
    pub deployment_poll_interval: Duration,
    pub deployment_max_polls: u32,
    /// Domain under which exposed service URLs are published.
    pub service_domain: String,
    pub handoff: HandoffConfig,
    /// Wraps marketplace reads and writes to absorb rate limits.
    pub retry: RetryPolicy,
    pub max_in_flight_side_calls: usize,
    pub watch_queue_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            provider: "decentralized-compute".to_string(),
            tick_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            extend_threshold_secs: 5 * 60,
            extend_by_secs: 30 * 60,
            min_runtime_for_redeploy_secs: 20 * 60,
            deployment_poll_interval: Duration::from_secs(2),
            deployment_max_polls: 30,
            service_domain: DEFAULT_SERVICE_DOMAIN.to_string(),
            handoff: HandoffConfig::default(),
            retry: RetryPolicy::default(),
            max_in_flight_side_calls: DEFAULT_MAX_IN_FLIGHT_SIDE_CALLS,
            watch_queue_capacity: 256,
        }
    }
}
