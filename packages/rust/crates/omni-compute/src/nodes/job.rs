use std::path::PathBuf;

use anyhow::{Context, anyhow};
use serde_json::Value;

use omni_compute::{
    ComputeSettings, LaunchRequest, Marketplace, ResourceProfile, RetryPolicy,
};

use crate::cli::ResourceArgs;
use crate::controller_builder::{build_clients, build_controller};

use super::print_json;
use super::watch::wait_for_shutdown;

pub(crate) struct LaunchCommandRequest {
    pub(crate) definition_path: PathBuf,
    pub(crate) market: Option<String>,
    pub(crate) confidential: bool,
    pub(crate) resources: ResourceArgs,
    pub(crate) watch: bool,
}

pub(crate) async fn run_launch_mode(
    request: LaunchCommandRequest,
    settings: &ComputeSettings,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&request.definition_path).with_context(|| {
        format!(
            "failed to read job definition {}",
            request.definition_path.display()
        )
    })?;
    let definition: Value = serde_json::from_str(&raw).context("job definition is not JSON")?;
    let market = request
        .market
        .or_else(|| settings.marketplace.market.clone())
        .filter(|market| !market.trim().is_empty())
        .ok_or_else(|| anyhow!("market address missing: pass --market or set marketplace.market"))?;

    let clients = build_clients(settings)?;
    let controller = build_controller(&clients, settings);
    let outcome = controller
        .launch(LaunchRequest {
            definition,
            market,
            confidential: request.confidential,
            resources: ResourceProfile {
                gpu: request.resources.gpu,
                vcpu: request.resources.vcpu,
                ram_gb: request.resources.ram_gb,
            },
        })
        .await?;
    print_json(&outcome)?;

    if request.watch {
        wait_for_shutdown(&controller).await?;
    }
    Ok(())
}

pub(crate) async fn run_stop_mode(job: &str, settings: &ComputeSettings) -> anyhow::Result<()> {
    let clients = build_clients(settings)?;
    let controller = build_controller(&clients, settings);
    let receipt = controller.stop(job).await?;
    print_json(&receipt)
}

pub(crate) async fn run_extend_mode(
    job: &str,
    seconds: u64,
    settings: &ComputeSettings,
) -> anyhow::Result<()> {
    let clients = build_clients(settings)?;
    let controller = build_controller(&clients, settings);
    let receipt = controller.extend(job, seconds).await?;
    print_json(&receipt)
}

pub(crate) async fn run_status_mode(job: &str, settings: &ComputeSettings) -> anyhow::Result<()> {
    let clients = build_clients(settings)?;
    let snapshot = RetryPolicy::default()
        .run("get_job", || clients.marketplace.get_job(job))
        .await?;
    print_json(&snapshot)
}

pub(crate) async fn run_results_mode(job: &str, settings: &ComputeSettings) -> anyhow::Result<()> {
    let clients = build_clients(settings)?;
    let controller = build_controller(&clients, settings);
    let results = controller.fetch_results(job).await?;
    print_json(&results)
}
