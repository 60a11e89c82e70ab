use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "omni-compute")]
#[command(about = "Decentralized compute jobs: launch, watch, extend, stop, stream logs.")]
pub(crate) struct Cli {
    /// Config home holding `omni-compute/compute.yaml`; absolute or relative to `PRJ_ROOT`.
    #[arg(long, global = true)]
    pub(crate) conf: Option<PathBuf>,

    /// Debug logging for omni_compute (ignored when RUST_LOG is set).
    #[arg(long, global = true)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ResourceArgs {
    #[arg(long, default_value_t = 0)]
    pub(crate) gpu: u32,

    #[arg(long, default_value_t = 0)]
    pub(crate) vcpu: u32,

    #[arg(long, default_value_t = 0)]
    pub(crate) ram_gb: u32,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the watch controller until Ctrl+C. Recovers known jobs on start.
    Watch {
        /// Skip the startup recovery scan.
        #[arg(long)]
        no_recover: bool,
    },
    /// Post a job definition (JSON file) and optionally keep watching it.
    Launch {
        /// Path to the job definition JSON.
        #[arg(long)]
        definition: PathBuf,

        /// Market address (default: marketplace.market from settings).
        #[arg(long)]
        market: Option<String>,

        /// Keep the payload off public storage until the node runs the job.
        #[arg(long)]
        confidential: bool,

        #[command(flatten)]
        resources: ResourceArgs,

        /// Stay in the foreground and supervise the job after launch.
        #[arg(long)]
        watch: bool,
    },
    /// Stop a job.
    Stop { job: String },
    /// Extend the lease of a job.
    Extend {
        job: String,

        /// Seconds to add (default: 1800).
        #[arg(long, default_value_t = 1800)]
        seconds: u64,
    },
    /// Print the marketplace view of a job.
    Status { job: String },
    /// Print the results of a finished job.
    Results { job: String },
    /// Stream live logs of a running job until Ctrl+C.
    Logs {
        job: String,

        /// Node identifier (default: read from the job).
        #[arg(long)]
        node: Option<String>,
    },
    /// Print the credit balance of the delegated account.
    Balance,
    /// Generate a local Ed25519 signing identity.
    Keygen {
        /// Output path for the keypair (JSON byte array).
        #[arg(long)]
        out: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}
