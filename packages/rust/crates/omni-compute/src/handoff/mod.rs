//! Confidential handoff: keep the real payload off public storage until the
//! executing node is confirmed running, then push it to that node directly.

mod expose;
mod placeholder;

use std::time::Duration;

use serde_json::Value;

pub use expose::{DEFAULT_SERVICE_DOMAIN, resolve_service_urls};
pub use placeholder::build_placeholder;

use crate::error::{ComputeError, Result};
use crate::marketplace::{JobState, Marketplace};
use crate::node::NodeClient;
use crate::retry::RetryPolicy;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
const DEFAULT_MAX_POLLS: u32 = 600;
const DEFAULT_READ_ATTEMPTS: u32 = 3;
const DEFAULT_READ_RETRY_BASE_SECS: u64 = 2;

/// Polling budget for the handoff.
#[derive(Debug, Clone, Copy)]
pub struct HandoffConfig {
    pub poll_interval: Duration,
    pub max_polls: u32,
    /// Wraps each job-state read to absorb rate limits.
    pub read_retry: RetryPolicy,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_polls: DEFAULT_MAX_POLLS,
            read_retry: RetryPolicy::new(
                DEFAULT_READ_ATTEMPTS,
                Duration::from_secs(DEFAULT_READ_RETRY_BASE_SECS),
            ),
        }
    }
}

/// How a handoff ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// Definition pushed to `node`; first resolved service URL, if any.
    Delivered {
        node: String,
        service_url: Option<String>,
    },
    /// Job reached a terminal state before it ever ran; nothing was pushed.
    Aborted(JobState),
}

/// Wait for `job_address` to run, then push `definition` to its node.
pub async fn run_handoff(
    marketplace: &dyn Marketplace,
    node_client: &NodeClient,
    job_address: &str,
    definition: &Value,
    service_domain: &str,
    config: &HandoffConfig,
) -> Result<HandoffOutcome> {
    let node = match wait_for_running(marketplace, job_address, config).await? {
        RunningOrTerminal::Running(node) => node,
        RunningOrTerminal::Terminal(state) => {
            tracing::warn!(
                event = "compute.handoff.aborted",
                job_address,
                state = %state,
                "job ended before running; confidential definition not sent"
            );
            return Ok(HandoffOutcome::Aborted(state));
        }
    };

    node_client
        .push_job_definition(&node, job_address, definition)
        .await?;
    let service_url = resolve_service_urls(job_address, definition, service_domain)
        .into_iter()
        .next();
    Ok(HandoffOutcome::Delivered { node, service_url })
}

enum RunningOrTerminal {
    Running(String),
    Terminal(JobState),
}

async fn wait_for_running(
    marketplace: &dyn Marketplace,
    job_address: &str,
    config: &HandoffConfig,
) -> Result<RunningOrTerminal> {
    for attempt in 1..=config.max_polls {
        let read = config
            .read_retry
            .run("handoff.get_job", || marketplace.get_job(job_address))
            .await;
        match read {
            Ok(snapshot) => match snapshot.state {
                JobState::Running => {
                    if let Some(node) = snapshot.node.filter(|node| !node.is_empty()) {
                        tracing::info!(
                            event = "compute.handoff.running",
                            job_address,
                            node = %node,
                            attempt,
                            "job running; pushing confidential definition"
                        );
                        return Ok(RunningOrTerminal::Running(node));
                    }
                }
                state if state.is_terminal() => {
                    return Ok(RunningOrTerminal::Terminal(state));
                }
                _ => {}
            },
            Err(error) => {
                tracing::debug!(
                    event = "compute.handoff.poll_failed",
                    job_address,
                    attempt,
                    error = %error,
                    "job state read failed during handoff"
                );
            }
        }
        tokio::time::sleep(config.poll_interval).await;
    }
    Err(ComputeError::HandoffTimeout(job_address.to_string()))
}
