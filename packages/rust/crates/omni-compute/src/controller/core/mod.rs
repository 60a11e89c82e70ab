//! Core runtime for the lifecycle controller.

mod launch;
mod supervisor;
mod watch;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::auth::AuthProvider;
use crate::controller::types::{ControllerConfig, ControllerDeps, RecoveryReport, WatchedJob};
use crate::controller::{ResourceProfile, WatchRegistry};
use crate::error::{ComputeError, Result};
use crate::marketplace::{CreditBalance, ExtendReceipt, Marketplace, StopReceipt};
use crate::node::NodeClient;
use crate::sinks::SideCallDispatcher;

use supervisor::WatchCommand;

/// Supervises marketplace jobs from launch to termination.
pub struct JobLifecycleController {
    marketplace: Arc<dyn Marketplace>,
    auth: Arc<AuthProvider>,
    node_client: Arc<NodeClient>,
    side_calls: SideCallDispatcher,
    registry: WatchRegistry,
    watch_tx: mpsc::Sender<WatchCommand>,
    config: ControllerConfig,
}

impl JobLifecycleController {
    /// Start the controller and its watch supervisor.
    pub fn start(deps: ControllerDeps, mut config: ControllerConfig) -> Arc<Self> {
        config.watch_queue_capacity = config.watch_queue_capacity.max(1);
        config.max_in_flight_side_calls = config.max_in_flight_side_calls.max(1);
        config.deployment_max_polls = config.deployment_max_polls.max(1);

        let (watch_tx, watch_rx) = mpsc::channel::<WatchCommand>(config.watch_queue_capacity);
        let side_calls = SideCallDispatcher::new(
            deps.heartbeat_sink,
            deps.audit_sink,
            config.max_in_flight_side_calls,
        );

        let controller = Arc::new(Self {
            marketplace: deps.marketplace,
            auth: deps.auth,
            node_client: deps.node_client,
            side_calls,
            registry: deps.registry,
            watch_tx,
            config,
        });
        controller.spawn_supervisor(watch_rx);

        tracing::info!(
            event = "compute.controller.started",
            auth_mode = controller.auth.mode().as_str(),
            tick_secs = controller.config.tick_interval.as_secs(),
            "job lifecycle controller started"
        );
        controller
    }

    /// Registry handle shared with the watch tasks.
    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub async fn watched_jobs(&self) -> Vec<WatchedJob> {
        self.registry.snapshot().await
    }

    pub async fn watched_job(&self, job_address: &str) -> Option<WatchedJob> {
        self.registry.get(job_address).await
    }

    /// Put an already-posted job under supervision. Returns `false` if it was already watched.
    pub async fn adopt(&self, job: WatchedJob) -> bool {
        let job_address = job.job_address.clone();
        if !self.registry.insert_new(job).await {
            return false;
        }
        self.request_watch(&job_address).await;
        true
    }

    /// Stop a job at the user's request. The watch loop will not redeploy it.
    pub async fn stop(&self, job_address: &str) -> Result<StopReceipt> {
        if !self.registry.mark_user_stopped(job_address).await {
            tracing::debug!(
                event = "compute.controller.stop_unwatched",
                job_address,
                "stopping a job that is not watched"
            );
        }
        let receipt = self
            .config
            .retry
            .run("stop_job", || self.marketplace.stop_job(job_address))
            .await?;
        tracing::info!(
            event = "compute.controller.stopped",
            job_address,
            delisted = receipt.delisted,
            tx = receipt.tx.as_deref().unwrap_or_default(),
            "job stop submitted"
        );
        Ok(receipt)
    }

    /// Extend the lease of a job by `seconds`.
    pub async fn extend(&self, job_address: &str, seconds: u64) -> Result<ExtendReceipt> {
        let receipt = self
            .config
            .retry
            .run("extend_job", || self.marketplace.extend_job(job_address, seconds))
            .await?;
        self.registry.record_extension(job_address, Utc::now()).await;
        tracing::info!(
            event = "compute.controller.extended",
            job_address,
            seconds,
            tx = receipt.tx.as_deref().unwrap_or_default(),
            "job lease extended"
        );
        Ok(receipt)
    }

    pub async fn credit_balance(&self) -> Result<CreditBalance> {
        self.marketplace.credit_balance().await
    }

    /// Results of a finished job: the public result blob, else the node's
    /// confidential results endpoint.
    pub async fn fetch_results(&self, job_address: &str) -> Result<Value> {
        let snapshot = self
            .config
            .retry
            .run("get_job", || self.marketplace.get_job(job_address))
            .await?;
        if let Some(result_ref) = snapshot.result_ref.as_deref().filter(|r| !r.is_empty()) {
            match self.marketplace.retrieve_blob(result_ref).await {
                Ok(results) => return Ok(results),
                Err(error) => {
                    tracing::debug!(
                        event = "compute.controller.result_blob_unavailable",
                        job_address,
                        result_ref,
                        error = %error,
                        "public result blob unavailable; asking node"
                    );
                }
            }
        }
        let Some(node) = snapshot.node.as_deref().filter(|n| !n.is_empty()) else {
            return Err(ComputeError::ResultsUnavailable(job_address.to_string()));
        };
        self.node_client.fetch_results(node, job_address).await
    }

    /// Startup recovery scan.
    ///
    /// With a bulk listing (local identity) every live job owned by this
    /// identity is adopted. Without one (delegated identity) only in-memory
    /// registry entries can be re-armed.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let listing = match self.marketplace.list_all_jobs().await {
            Ok(listing) => listing,
            Err(ComputeError::Unsupported(reason)) => {
                tracing::info!(
                    event = "compute.controller.recovery_limited",
                    reason = %reason,
                    "bulk listing unavailable; recovery limited to in-memory registry"
                );
                for job in self.registry.snapshot().await {
                    self.request_watch(&job.job_address).await;
                    report.rearmed += 1;
                }
                return Ok(report);
            }
            Err(error) => return Err(error),
        };
        report.listing_supported = true;

        let identity = self.auth.identity();
        for snapshot in listing {
            if snapshot.state.is_terminal() {
                continue;
            }
            if let Some(identity) = identity.as_deref()
                && snapshot.owner.as_deref() != Some(identity)
            {
                continue;
            }
            if self.registry.contains(&snapshot.address).await {
                self.request_watch(&snapshot.address).await;
                report.rearmed += 1;
                continue;
            }
            let definition = match snapshot.definition_ref.as_deref() {
                Some(definition_ref) => self
                    .marketplace
                    .retrieve_blob(definition_ref)
                    .await
                    .unwrap_or_else(|error| {
                        tracing::warn!(
                            event = "compute.controller.recovery_definition_missing",
                            job_address = %snapshot.address,
                            error = %error,
                            "definition blob unavailable; job will not be redeployable"
                        );
                        Value::Null
                    }),
                None => Value::Null,
            };
            let mut job = WatchedJob::new(
                &snapshot.address,
                definition,
                snapshot.market.as_deref().unwrap_or_default(),
                false,
                ResourceProfile::default(),
            );
            if let Some(started) = snapshot
                .time_start
                .filter(|start| *start > 0)
                .and_then(|start| DateTime::<Utc>::from_timestamp(start, 0))
            {
                job.start_time = started;
                job.last_extend_time = started;
            }
            if self.adopt(job).await {
                report.recovered += 1;
            }
        }
        tracing::info!(
            event = "compute.controller.recovered",
            recovered = report.recovered,
            rearmed = report.rearmed,
            "startup recovery scan finished"
        );
        Ok(report)
    }

    async fn request_watch(&self, job_address: &str) {
        let command = WatchCommand::Start {
            job_address: job_address.to_string(),
        };
        if self.watch_tx.send(command).await.is_err() {
            tracing::error!(
                event = "compute.controller.supervisor_closed",
                job_address,
                "watch supervisor is gone; job will not be watched"
            );
        }
    }
}
