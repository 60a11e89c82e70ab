use anyhow::anyhow;

use omni_compute::{ComputeSettings, LogStreamEvent, Marketplace};

use crate::controller_builder::{build_clients, build_log_client};

pub(crate) async fn run_logs_mode(
    job: &str,
    node: Option<String>,
    settings: &ComputeSettings,
) -> anyhow::Result<()> {
    let clients = build_clients(settings)?;
    let node = match node {
        Some(node) => node,
        None => clients
            .marketplace
            .get_job(job)
            .await?
            .node
            .filter(|node| !node.is_empty())
            .ok_or_else(|| anyhow!("job {job} has no node yet; pass --node"))?,
    };

    let client = build_log_client(&clients, settings);
    let mut stream = client.connect(&node, job).await?;
    loop {
        tokio::select! {
            event = stream.next_event() => match event {
                Some(LogStreamEvent::Log(payload)) => println!("{payload}"),
                Some(LogStreamEvent::Raw(line)) => println!("{line}"),
                Some(LogStreamEvent::Error(error)) => {
                    tracing::warn!(job_address = job, error = %error, "log stream error");
                }
                Some(LogStreamEvent::Closed) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                stream.close();
                break;
            }
        }
    }
    Ok(())
}
