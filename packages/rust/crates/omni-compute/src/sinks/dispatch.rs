use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::Result;

use super::{AuditEvent, AuditSink, HeartbeatSink, InventoryHeartbeat};

/// Upper bound on detached heartbeat/audit requests in flight.
pub const DEFAULT_MAX_IN_FLIGHT_SIDE_CALLS: usize = 32;

/// Spawns best-effort side calls as detached tasks, bounded by a semaphore.
///
/// Results are never awaited by the caller; failures are logged. When the
/// bound is reached new calls wait for a permit inside their own task, so
/// every call is eventually delivered.
pub struct SideCallDispatcher {
    permits: Arc<Semaphore>,
    heartbeat_sink: Arc<dyn HeartbeatSink>,
    audit_sink: Arc<dyn AuditSink>,
}

impl SideCallDispatcher {
    pub fn new(
        heartbeat_sink: Arc<dyn HeartbeatSink>,
        audit_sink: Arc<dyn AuditSink>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            heartbeat_sink,
            audit_sink,
        }
    }

    pub fn heartbeat(&self, heartbeat: InventoryHeartbeat) {
        let sink = Arc::clone(&self.heartbeat_sink);
        let job_address = heartbeat.provider_instance_id.clone();
        let state = heartbeat.state.as_str();
        self.spawn("heartbeat", job_address, state, async move {
            sink.send_heartbeat(&heartbeat).await
        });
    }

    pub fn audit(&self, event: AuditEvent) {
        let sink = Arc::clone(&self.audit_sink);
        let job_address = event.resource_id.clone();
        self.spawn("audit", job_address, "event", async move {
            sink.record(&event).await
        });
    }

    fn spawn<F>(&self, kind: &'static str, job_address: String, detail: &'static str, call: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(
                    event = "compute.side_call.dropped",
                    kind,
                    job_address = %job_address,
                    detail,
                    "side call dropped: dispatcher closed"
                );
                return;
            };
            if let Err(error) = call.await {
                tracing::debug!(
                    event = "compute.side_call.failed",
                    kind,
                    job_address = %job_address,
                    detail,
                    error = %error,
                    "side call failed; ignoring"
                );
            }
        });
    }
}
