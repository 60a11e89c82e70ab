//! omni-compute CLI: launch and supervise decentralized compute jobs.
//!
//! Logging: set `RUST_LOG=omni_compute=info` (or `warn`, `debug`) to see logs on stderr.

mod cli;
mod controller_builder;
mod nodes;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use omni_compute::{load_compute_settings, set_config_home_override};

use crate::cli::{Cli, Command};
use crate::nodes::{
    LaunchCommandRequest, run_balance_mode, run_extend_mode, run_keygen_mode, run_launch_mode,
    run_logs_mode, run_results_mode, run_status_mode, run_stop_mode, run_watch_mode,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Some(conf_dir) = cli.conf.clone() {
        set_config_home_override(conf_dir);
    }
    let settings = load_compute_settings();

    // RUST_LOG overrides; --verbose => debug; else info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "omni_compute=debug"
        } else {
            "omni_compute=info"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.command {
        Command::Watch { no_recover } => run_watch_mode(no_recover, &settings).await,
        Command::Launch {
            definition,
            market,
            confidential,
            resources,
            watch,
        } => {
            run_launch_mode(
                LaunchCommandRequest {
                    definition_path: definition,
                    market,
                    confidential,
                    resources,
                    watch,
                },
                &settings,
            )
            .await
        }
        Command::Stop { job } => run_stop_mode(&job, &settings).await,
        Command::Extend { job, seconds } => run_extend_mode(&job, seconds, &settings).await,
        Command::Status { job } => run_status_mode(&job, &settings).await,
        Command::Results { job } => run_results_mode(&job, &settings).await,
        Command::Logs { job, node } => run_logs_mode(&job, node, &settings).await,
        Command::Balance => run_balance_mode(&settings).await,
        Command::Keygen { out, force } => run_keygen_mode(&out, force),
    }
}
