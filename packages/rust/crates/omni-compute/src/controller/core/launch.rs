use std::sync::Arc;

use crate::controller::types::{LaunchOutcome, LaunchRequest, WatchedJob};
use crate::error::{ComputeError, Result};
use crate::handoff::{HandoffOutcome, build_placeholder, resolve_service_urls, run_handoff};
use crate::marketplace::PostedJob;
use crate::sinks::AuditEvent;

use super::JobLifecycleController;

impl JobLifecycleController {
    /// Post a job and put it under supervision.
    ///
    /// Confidential jobs are posted with a stripped placeholder; the real
    /// definition is pushed to the node by a detached handoff task once the
    /// job runs. Handoff failures never reach the caller.
    pub async fn launch(self: &Arc<Self>, request: LaunchRequest) -> Result<LaunchOutcome> {
        let LaunchRequest {
            definition,
            market,
            confidential,
            resources,
        } = request;
        if !definition.is_object() {
            return Err(ComputeError::InvalidDefinition(
                "job definition must be a JSON object".to_string(),
            ));
        }
        if market.trim().is_empty() {
            return Err(ComputeError::InvalidDefinition(
                "market address is required".to_string(),
            ));
        }

        let public_blob = if confidential {
            build_placeholder(&definition)?
        } else {
            definition.clone()
        };
        let content_ref = self
            .config
            .retry
            .run("pin_blob", || self.marketplace.pin_blob(&public_blob))
            .await?;
        let posted = self
            .config
            .retry
            .run("post_job", || self.marketplace.post_job(&content_ref, &market))
            .await?;
        let job_address = self.resolve_job_address(&posted).await?;

        let mut watched = WatchedJob::new(&job_address, definition.clone(), &market, confidential, resources);
        watched.deployment_handle.clone_from(&posted.deployment_handle);
        if !self.registry.insert_new(watched).await {
            tracing::warn!(
                event = "compute.controller.launch_duplicate",
                job_address = %job_address,
                "posted job address is already watched"
            );
        }

        if confidential {
            self.spawn_handoff(job_address.clone());
        } else if let Some(url) =
            resolve_service_urls(&job_address, &definition, &self.config.service_domain)
                .into_iter()
                .next()
        {
            self.registry.set_service_url_once(&job_address, url).await;
        }

        self.side_calls
            .audit(AuditEvent::launched(&job_address, &market, confidential));
        self.request_watch(&job_address).await;

        tracing::info!(
            event = "compute.controller.launched",
            job_address = %job_address,
            market = %market,
            confidential,
            content_ref = %content_ref,
            "job launched"
        );
        Ok(LaunchOutcome {
            job_address,
            tx: posted.tx,
            credits: posted.credits,
            content_ref,
            deployment_handle: posted.deployment_handle,
        })
    }

    async fn resolve_job_address(&self, posted: &PostedJob) -> Result<String> {
        if let Some(address) = posted.job_address.as_deref().filter(|a| !a.is_empty()) {
            return Ok(address.to_string());
        }
        let Some(handle) = posted.deployment_handle.as_deref() else {
            return Err(ComputeError::LaunchTimeout(
                "post returned neither a job address nor a deployment handle".to_string(),
            ));
        };

        for attempt in 1..=self.config.deployment_max_polls {
            let resolved = self
                .config
                .retry
                .run("resolve_deployment", || {
                    self.marketplace.resolve_deployment(handle)
                })
                .await;
            match resolved {
                Ok(Some(address)) if !address.is_empty() => {
                    tracing::debug!(
                        event = "compute.controller.deployment_resolved",
                        deployment = handle,
                        job_address = %address,
                        attempt,
                        "deployment resolved to job"
                    );
                    return Ok(address);
                }
                Ok(_) => {}
                Err(error @ ComputeError::Unsupported(_)) => return Err(error),
                Err(error) => {
                    tracing::debug!(
                        event = "compute.controller.deployment_poll_failed",
                        deployment = handle,
                        attempt,
                        error = %error,
                        "deployment lookup failed"
                    );
                }
            }
            tokio::time::sleep(self.config.deployment_poll_interval).await;
        }
        Err(ComputeError::LaunchTimeout(format!(
            "deployment {handle} did not resolve to a job after {} polls",
            self.config.deployment_max_polls
        )))
    }

    fn spawn_handoff(self: &Arc<Self>, job_address: String) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let Some(job) = controller.registry.get(&job_address).await else {
                return;
            };
            let outcome = run_handoff(
                controller.marketplace.as_ref(),
                &controller.node_client,
                &job_address,
                &job.definition,
                &controller.config.service_domain,
                &controller.config.handoff,
            )
            .await;
            match outcome {
                Ok(HandoffOutcome::Delivered { node, service_url }) => {
                    if let Some(url) = service_url {
                        controller
                            .registry
                            .set_service_url_once(&job_address, url)
                            .await;
                    }
                    tracing::info!(
                        event = "compute.controller.handoff_delivered",
                        job_address = %job_address,
                        node = %node,
                        "confidential handoff complete"
                    );
                }
                Ok(HandoffOutcome::Aborted(_)) => {}
                Err(error) => {
                    tracing::error!(
                        event = "compute.controller.handoff_failed",
                        job_address = %job_address,
                        error = %error,
                        "confidential handoff failed; job left as posted"
                    );
                }
            }
        });
    }
}
