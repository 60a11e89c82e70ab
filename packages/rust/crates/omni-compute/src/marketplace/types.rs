//! Marketplace read models and receipts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job state as reported by the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    /// Posted, waiting for a node.
    Queued,
    /// Claimed and executing on a node.
    Running,
    /// Finished and results posted.
    Completed,
    /// Stopped before completion.
    Stopped,
    /// Any other terminal state reported by the marketplace.
    Other(String),
}

impl JobState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Self::Queued,
            "RUNNING" => Self::Running,
            "COMPLETED" | "DONE" => Self::Completed,
            "STOPPED" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Stopped => "STOPPED",
            Self::Other(state) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

impl From<String> for JobState {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.as_str().to_string()
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub address: String,
    pub state: JobState,
    /// Node executing the job, once claimed.
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default, alias = "ipfsJob")]
    pub definition_ref: Option<String>,
    #[serde(default, alias = "ipfsResult")]
    pub result_ref: Option<String>,
    #[serde(default, alias = "payer", alias = "project")]
    pub owner: Option<String>,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub market: Option<String>,
    /// Unix seconds at which the job started running.
    #[serde(default)]
    pub time_start: Option<i64>,
    /// Current lease length in seconds.
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<u64>,
}

impl JobSnapshot {
    /// Seconds left on the lease at `now_unix`, when the lease is known.
    pub fn lease_remaining_secs(&self, now_unix: i64) -> Option<i64> {
        let start = self.time_start.filter(|start| *start > 0)?;
        let timeout = i64::try_from(self.timeout_secs?).ok()?;
        Some(start.saturating_add(timeout).saturating_sub(now_unix))
    }
}

/// Result of posting a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostedJob {
    /// Ledger transaction id.
    #[serde(default)]
    pub tx: Option<String>,
    /// Resolved job address, when known immediately.
    #[serde(default, rename = "job")]
    pub job_address: Option<String>,
    /// Deployment handle to poll when the address is not yet known.
    #[serde(default, rename = "deployment")]
    pub deployment_handle: Option<String>,
    /// Credit metadata returned by the delegated API.
    #[serde(default)]
    pub credits: Option<Value>,
}

/// Result of stopping a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopReceipt {
    #[serde(default)]
    pub tx: Option<String>,
    #[serde(default)]
    pub delisted: bool,
}

/// Result of extending a job lease.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendReceipt {
    #[serde(default)]
    pub tx: Option<String>,
    #[serde(default)]
    pub credits: Option<Value>,
}

/// Credit balance of the delegated account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    #[serde(default)]
    pub assigned_credits: f64,
    #[serde(default)]
    pub reserved_credits: f64,
    #[serde(default)]
    pub settled_credits: f64,
}

impl CreditBalance {
    /// Credits still spendable.
    pub fn available(&self) -> f64 {
        self.assigned_credits - self.reserved_credits - self.settled_credits
    }
}
