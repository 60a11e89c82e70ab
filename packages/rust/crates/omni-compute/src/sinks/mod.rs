//! Fire-and-forget collaborators: orchestrator inventory heartbeats and audit events.

mod dispatch;
mod http;
mod types;

use async_trait::async_trait;

pub use dispatch::{DEFAULT_MAX_IN_FLIGHT_SIDE_CALLS, SideCallDispatcher};
pub use http::{HttpAuditSink, HttpHeartbeatSink};
pub use types::{AuditEvent, InstanceState, InventoryHeartbeat};

use crate::error::Result;

/// Receives per-job inventory heartbeats.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn send_heartbeat(&self, heartbeat: &InventoryHeartbeat) -> Result<()>;
}

/// Receives audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Sink used when no endpoint is configured; accepts and drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSink;

#[async_trait]
impl HeartbeatSink for DisabledSink {
    async fn send_heartbeat(&self, _heartbeat: &InventoryHeartbeat) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AuditSink for DisabledSink {
    async fn record(&self, _event: &AuditEvent) -> Result<()> {
        Ok(())
    }
}
