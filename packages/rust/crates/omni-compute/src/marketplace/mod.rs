//! Marketplace capability boundary.
//!
//! The ledger client is opaque to the controller: everything it needs goes
//! through [`Marketplace`]. [`DelegatedApiClient`] implements it over the
//! delegated HTTP API; a ledger-backed client can implement it directly.

mod content_store;
mod delegated;
mod types;

use async_trait::async_trait;
use serde_json::Value;

pub use content_store::PinningContentStore;
pub use delegated::DelegatedApiClient;
pub use types::{CreditBalance, ExtendReceipt, JobSnapshot, JobState, PostedJob, StopReceipt};

use crate::error::{ComputeError, Result};

/// Operations the lifecycle controller consumes from a compute marketplace.
#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Post a job whose definition is pinned at `content_ref`.
    async fn post_job(&self, content_ref: &str, market: &str) -> Result<PostedJob>;

    /// Resolve a deployment handle into a job address, `None` while pending.
    async fn resolve_deployment(&self, _handle: &str) -> Result<Option<String>> {
        Err(ComputeError::Unsupported(
            "deployment handles are not offered by this marketplace client".to_string(),
        ))
    }

    async fn get_job(&self, address: &str) -> Result<JobSnapshot>;

    async fn stop_job(&self, address: &str) -> Result<StopReceipt>;

    async fn extend_job(&self, address: &str, seconds: u64) -> Result<ExtendReceipt>;

    /// Pin a JSON blob to content-addressed storage and return its reference.
    async fn pin_blob(&self, value: &Value) -> Result<String>;

    async fn retrieve_blob(&self, content_ref: &str) -> Result<Value>;

    /// List every job on the marketplace. Only available under a local identity.
    async fn list_all_jobs(&self) -> Result<Vec<JobSnapshot>> {
        Err(ComputeError::Unsupported(
            "bulk job listing requires a local signing identity".to_string(),
        ))
    }

    async fn credit_balance(&self) -> Result<CreditBalance> {
        Err(ComputeError::Unsupported(
            "credit balance requires the delegated API".to_string(),
        ))
    }
}
