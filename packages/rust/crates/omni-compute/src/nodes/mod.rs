mod account;
mod job;
mod logs;
mod watch;

pub(crate) use account::{run_balance_mode, run_keygen_mode};
pub(crate) use job::{
    LaunchCommandRequest, run_extend_mode, run_launch_mode, run_results_mode, run_status_mode,
    run_stop_mode,
};
pub(crate) use logs::run_logs_mode;
pub(crate) use watch::run_watch_mode;

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
