//! Job lifecycle controller: launch, confidential handoff, watch, extend, redeploy.

mod core;
mod policy;
mod registry;
mod types;

pub use core::JobLifecycleController;
pub use policy::{TerminationDecision, decide_termination, should_extend};
pub use registry::WatchRegistry;
pub use types::{
    ControllerConfig, ControllerDeps, LaunchOutcome, LaunchRequest, RecoveryReport,
    ResourceProfile, WatchedJob,
};
