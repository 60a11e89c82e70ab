use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;

use crate::controller::policy::{TerminationDecision, decide_termination, should_extend};
use crate::controller::types::{LaunchRequest, WatchedJob};
use crate::error::Result;
use crate::marketplace::{JobSnapshot, JobState};
use crate::sinks::{AuditEvent, InventoryHeartbeat};

use super::JobLifecycleController;

/// Per-task memory carried between ticks.
#[derive(Default)]
struct TickState {
    last_state: Option<JobState>,
    last_heartbeat: Option<Instant>,
}

enum TickFlow {
    Continue,
    Finished,
}

impl JobLifecycleController {
    /// Watch one job until it is resolved or leaves the registry.
    ///
    /// Returns the address so the supervisor can release its slot.
    pub(super) async fn watch(self: Arc<Self>, job_address: String) -> String {
        tracing::info!(
            event = "compute.watch.started",
            job_address = %job_address,
            "watching job"
        );
        let mut state = TickState::default();
        loop {
            let Some(job) = self.registry.get(&job_address).await else {
                tracing::info!(
                    event = "compute.watch.released",
                    job_address = %job_address,
                    "job no longer in registry; watch exiting"
                );
                break;
            };
            match self.tick(&job, &mut state).await {
                Ok(TickFlow::Finished) => break,
                Ok(TickFlow::Continue) => {}
                Err(error) => {
                    tracing::warn!(
                        event = "compute.watch.tick_failed",
                        job_address = %job_address,
                        error = %error,
                        "watch tick failed; retrying next tick"
                    );
                }
            }
            tokio::time::sleep(self.config.tick_interval).await;
        }
        job_address
    }

    async fn tick(
        self: &Arc<Self>,
        job: &WatchedJob,
        state: &mut TickState,
    ) -> Result<TickFlow> {
        let address = job.job_address.as_str();
        let snapshot = self
            .config
            .retry
            .run("get_job", || self.marketplace.get_job(address))
            .await?;

        if state.last_state.as_ref() != Some(&snapshot.state) {
            self.side_calls.audit(AuditEvent::state_changed(
                address,
                state.last_state.as_ref().map(JobState::as_str),
                snapshot.state.as_str(),
            ));
            tracing::debug!(
                event = "compute.watch.state_changed",
                job_address = address,
                state = %snapshot.state,
                "job state changed"
            );
            state.last_state = Some(snapshot.state.clone());
        }

        if snapshot.state == JobState::Running {
            self.maybe_extend(job, &snapshot).await;
            self.maybe_heartbeat(job, state);
            return Ok(TickFlow::Continue);
        }
        if snapshot.state.is_terminal() {
            self.resolve_termination(job, &snapshot.state).await;
            return Ok(TickFlow::Finished);
        }
        Ok(TickFlow::Continue)
    }

    async fn maybe_extend(&self, job: &WatchedJob, snapshot: &JobSnapshot) {
        let remaining = snapshot.lease_remaining_secs(Utc::now().timestamp());
        if !should_extend(remaining, self.config.extend_threshold_secs) {
            return;
        }
        let address = job.job_address.as_str();
        let seconds = self.config.extend_by_secs;
        match self
            .config
            .retry
            .run("extend_job", || self.marketplace.extend_job(address, seconds))
            .await
        {
            Ok(receipt) => {
                self.registry.record_extension(address, Utc::now()).await;
                tracing::info!(
                    event = "compute.watch.extended",
                    job_address = address,
                    remaining_secs = remaining.unwrap_or_default(),
                    extend_by_secs = seconds,
                    tx = receipt.tx.as_deref().unwrap_or_default(),
                    "lease auto-extended"
                );
            }
            Err(error) => {
                tracing::warn!(
                    event = "compute.watch.extend_failed",
                    job_address = address,
                    error = %error,
                    "auto-extend failed; lease may be reclaimed"
                );
            }
        }
    }

    fn maybe_heartbeat(&self, job: &WatchedJob, state: &mut TickState) {
        let due = state
            .last_heartbeat
            .is_none_or(|sent| sent.elapsed() >= self.config.heartbeat_interval);
        if !due {
            return;
        }
        state.last_heartbeat = Some(Instant::now());
        self.side_calls.heartbeat(InventoryHeartbeat::ready(
            &self.config.provider,
            &job.job_address,
            job.resources,
            job.service_url.clone(),
        ));
    }

    async fn resolve_termination(
        self: &Arc<Self>,
        job: &WatchedJob,
        final_state: &JobState,
    ) {
        let address = job.job_address.as_str();
        let provider = self.config.provider.as_str();
        // Re-read so a stop issued during this tick is honoured.
        let user_stopped = self
            .registry
            .get(address)
            .await
            .map_or(job.user_stopped, |current| current.user_stopped);
        let runtime_secs = (Utc::now() - job.start_time).num_seconds();
        self.side_calls.audit(AuditEvent::terminated(
            address,
            final_state.as_str(),
            runtime_secs,
            user_stopped,
        ));

        let decision = decide_termination(
            user_stopped,
            runtime_secs,
            job.is_redeployable(),
            self.config.min_runtime_for_redeploy_secs,
        );
        tracing::info!(
            event = "compute.watch.terminated",
            job_address = address,
            state = %final_state,
            runtime_secs,
            user_stopped,
            decision = ?decision,
            "job reached a terminal state"
        );

        match decision {
            TerminationDecision::UserStopped | TerminationDecision::Release => {
                self.side_calls
                    .heartbeat(InventoryHeartbeat::terminated(provider, address));
            }
            TerminationDecision::Flapping => {
                self.side_calls
                    .heartbeat(InventoryHeartbeat::failed(provider, address));
            }
            TerminationDecision::Redeploy => {
                self.redeploy(job).await;
                self.side_calls
                    .heartbeat(InventoryHeartbeat::terminated(provider, address));
            }
        }
        self.registry.remove(address).await;
    }

    async fn redeploy(self: &Arc<Self>, job: &WatchedJob) {
        let address = job.job_address.as_str();
        let provider = self.config.provider.as_str();
        let request = LaunchRequest {
            definition: job.definition.clone(),
            market: job.market.clone(),
            confidential: job.confidential,
            resources: job.resources,
        };
        match self.launch(request).await {
            Ok(outcome) => {
                self.side_calls.heartbeat(InventoryHeartbeat::provisioning(
                    provider,
                    &outcome.job_address,
                    address,
                    job.resources,
                ));
                self.side_calls.audit(AuditEvent::redeployed(
                    address,
                    Some(&outcome.job_address),
                    None,
                ));
                tracing::info!(
                    event = "compute.watch.redeployed",
                    job_address = address,
                    new_job_address = %outcome.job_address,
                    "job redeployed"
                );
            }
            Err(error) => {
                let message = error.to_string();
                self.side_calls
                    .heartbeat(InventoryHeartbeat::failed(provider, address));
                self.side_calls
                    .audit(AuditEvent::redeployed(address, None, Some(&message)));
                tracing::error!(
                    event = "compute.watch.redeploy_failed",
                    job_address = address,
                    error = %message,
                    "redeploy failed"
                );
            }
        }
    }
}
