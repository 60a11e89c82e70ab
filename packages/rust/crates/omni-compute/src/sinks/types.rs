use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::controller::ResourceProfile;

const READY_HEALTH_SCORE: u8 = 100;
const PROVISIONING_HEALTH_SCORE: u8 = 50;

/// Instance state reported to the orchestrator inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Ready,
    Provisioning,
    Failed,
    Terminated,
}

impl InstanceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Provisioning => "provisioning",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        }
    }
}

/// Body of `POST {orchestrator}/inventory/heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryHeartbeat {
    pub provider: String,
    pub provider_instance_id: String,
    pub gpu_allocated: u32,
    pub vcpu_allocated: u32,
    pub ram_gb_allocated: u32,
    pub health_score: u8,
    pub state: InstanceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_provider_instance_id: Option<String>,
}

impl InventoryHeartbeat {
    pub fn ready(
        provider: &str,
        job_address: &str,
        resources: ResourceProfile,
        expose_url: Option<String>,
    ) -> Self {
        Self::allocated(provider, job_address, resources, InstanceState::Ready, READY_HEALTH_SCORE)
            .with_expose_url(expose_url)
    }

    /// Links the replacement job to the address it replaces.
    pub fn provisioning(
        provider: &str,
        new_job_address: &str,
        old_job_address: &str,
        resources: ResourceProfile,
    ) -> Self {
        let mut heartbeat = Self::allocated(
            provider,
            new_job_address,
            resources,
            InstanceState::Provisioning,
            PROVISIONING_HEALTH_SCORE,
        );
        heartbeat.old_provider_instance_id = Some(old_job_address.to_string());
        heartbeat
    }

    pub fn failed(provider: &str, job_address: &str) -> Self {
        Self::released(provider, job_address, InstanceState::Failed)
    }

    /// Always reports zero allocation and zero health.
    pub fn terminated(provider: &str, job_address: &str) -> Self {
        Self::released(provider, job_address, InstanceState::Terminated)
    }

    fn allocated(
        provider: &str,
        job_address: &str,
        resources: ResourceProfile,
        state: InstanceState,
        health_score: u8,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            provider_instance_id: job_address.to_string(),
            gpu_allocated: resources.gpu,
            vcpu_allocated: resources.vcpu,
            ram_gb_allocated: resources.ram_gb,
            health_score,
            state,
            expose_url: None,
            old_provider_instance_id: None,
        }
    }

    fn released(provider: &str, job_address: &str, state: InstanceState) -> Self {
        Self::allocated(provider, job_address, ResourceProfile::default(), state, 0)
    }

    fn with_expose_url(mut self, expose_url: Option<String>) -> Self {
        self.expose_url = expose_url;
        self
    }
}

/// Body of `POST {audit}/audit/internal/log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Value,
    pub status: String,
}

impl AuditEvent {
    fn job(action: &str, job_address: &str, details: Value, status: &str) -> Self {
        Self {
            action: action.to_string(),
            resource_type: "job".to_string(),
            resource_id: job_address.to_string(),
            details,
            status: status.to_string(),
        }
    }

    pub fn launched(job_address: &str, market: &str, confidential: bool) -> Self {
        Self::job(
            "job.launch",
            job_address,
            json!({ "market": market, "confidential": confidential }),
            "success",
        )
    }

    pub fn state_changed(job_address: &str, previous: Option<&str>, current: &str) -> Self {
        Self::job(
            "job.state_change",
            job_address,
            json!({ "previous_state": previous, "state": current }),
            "success",
        )
    }

    pub fn terminated(
        job_address: &str,
        final_state: &str,
        runtime_secs: i64,
        user_stopped: bool,
    ) -> Self {
        Self::job(
            "job.terminated",
            job_address,
            json!({
                "final_state": final_state,
                "runtime_secs": runtime_secs,
                "user_initiated": user_stopped,
            }),
            "success",
        )
    }

    pub fn redeployed(old_job_address: &str, new_job_address: Option<&str>, error: Option<&str>) -> Self {
        let status = if error.is_some() { "failure" } else { "success" };
        Self::job(
            "job.redeploy",
            old_job_address,
            json!({ "new_job_address": new_job_address, "error": error }),
            status,
        )
    }
}
