use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};

use super::JobLifecycleController;

/// Messages understood by the watch supervisor.
#[derive(Debug, Clone)]
pub(super) enum WatchCommand {
    /// Start one watch task for the address unless one is already running.
    Start { job_address: String },
}

impl JobLifecycleController {
    /// One task per job address; redeploys send a new `Start` instead of nesting watches.
    pub(super) fn spawn_supervisor(self: &Arc<Self>, mut watch_rx: mpsc::Receiver<WatchCommand>) {
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut watchers = JoinSet::new();
            let mut active: HashMap<Id, String> = HashMap::new();

            loop {
                tokio::select! {
                    command = watch_rx.recv() => {
                        let Some(WatchCommand::Start { job_address }) = command else {
                            break;
                        };
                        if active.values().any(|watched| watched == &job_address) {
                            tracing::debug!(
                                event = "compute.supervisor.already_watching",
                                job_address = %job_address,
                                "watch task already running"
                            );
                            continue;
                        }
                        let Some(controller) = controller.upgrade() else {
                            break;
                        };
                        let handle = watchers.spawn(controller.watch(job_address.clone()));
                        active.insert(handle.id(), job_address);
                    }
                    Some(finished) = watchers.join_next_with_id(), if !watchers.is_empty() => {
                        match finished {
                            Ok((id, job_address)) => {
                                active.remove(&id);
                                tracing::debug!(
                                    event = "compute.supervisor.watch_finished",
                                    job_address = %job_address,
                                    "watch task finished"
                                );
                            }
                            Err(error) => {
                                let job_address = active.remove(&error.id()).unwrap_or_default();
                                tracing::error!(
                                    event = "compute.supervisor.watch_crashed",
                                    job_address = %job_address,
                                    error = %error,
                                    "watch task crashed"
                                );
                            }
                        }
                    }
                }
            }

            watchers.shutdown().await;
        });
    }
}
