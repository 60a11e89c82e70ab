use std::sync::Arc;

use omni_compute::{ComputeSettings, JobLifecycleController};

use crate::controller_builder::{build_clients, build_controller};

pub(crate) async fn run_watch_mode(
    no_recover: bool,
    settings: &ComputeSettings,
) -> anyhow::Result<()> {
    let clients = build_clients(settings)?;
    let controller = build_controller(&clients, settings);
    if !no_recover && settings.recover_on_start() {
        let report = controller.recover().await?;
        tracing::info!(
            listing_supported = report.listing_supported,
            recovered = report.recovered,
            rearmed = report.rearmed,
            "startup recovery finished"
        );
    }
    wait_for_shutdown(&controller).await
}

/// Block until Ctrl+C, then report what was still being watched.
pub(super) async fn wait_for_shutdown(controller: &Arc<JobLifecycleController>) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    let remaining = controller.watched_jobs().await;
    tracing::info!(
        watched = remaining.len(),
        "shutting down; watched jobs are left running on the marketplace"
    );
    Ok(())
}
