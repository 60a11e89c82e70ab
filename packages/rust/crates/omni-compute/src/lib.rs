//! Lifecycle controller for jobs on a decentralized compute marketplace.
//!
//! - **Launch**: pin the job definition (a stripped placeholder when
//!   confidential), post it, and hand the real payload to the node once it runs.
//! - **Watch**: one supervised task per job that audits state changes,
//!   auto-extends leases, heartbeats the orchestrator, and redeploys jobs that
//!   ended after a healthy run.
//! - **Logs**: reconnecting websocket client for live node logs.

#![allow(missing_docs)]

mod auth;
mod config;
mod controller;
mod error;
mod handoff;
mod logs;
mod marketplace;
mod node;
mod retry;
mod sinks;

pub use auth::{
    AuthMode, AuthProvider, AuthResult, DEFAULT_AUTH_CHALLENGE, DelegatedSigner,
    MessageSigningService, OfflineSigner, SIGNATURE_CACHE_TTL, SignedMessage, load_signing_key,
};
pub use config::{
    API_KEY_ENV, AUDIT_API_KEY_ENV, AuditSettings, AuthSettings, ComputeSettings,
    DEFAULT_API_URL, DEFAULT_GATEWAY_URL, DEFAULT_PIN_URL, LogSettings, MarketplaceSettings,
    NodeSettings, OrchestratorSettings, WatchSettings, compute_settings_paths,
    load_compute_settings, load_compute_settings_from_paths, set_config_home_override,
};
pub use controller::{
    ControllerConfig, ControllerDeps, JobLifecycleController, LaunchOutcome, LaunchRequest,
    RecoveryReport, ResourceProfile, TerminationDecision, WatchRegistry, WatchedJob,
    decide_termination, should_extend,
};
pub use error::{ComputeError, Result};
pub use handoff::{
    DEFAULT_SERVICE_DOMAIN, HandoffConfig, HandoffOutcome, build_placeholder,
    resolve_service_urls, run_handoff,
};
pub use logs::{
    LogStream, LogStreamClient, LogStreamConfig, LogStreamEvent, parse_frame, subscribe_message,
};
pub use marketplace::{
    CreditBalance, DelegatedApiClient, ExtendReceipt, JobSnapshot, JobState, Marketplace,
    PinningContentStore, PostedJob, StopReceipt,
};
pub use node::{
    DEFAULT_NODE_HTTP_URL_TEMPLATE, DEFAULT_NODE_WS_URL_TEMPLATE, NodeClient, NodeEndpoints,
};
pub use retry::RetryPolicy;
pub use sinks::{
    AuditEvent, AuditSink, DEFAULT_MAX_IN_FLIGHT_SIDE_CALLS, DisabledSink, HeartbeatSink,
    HttpAuditSink, HttpHeartbeatSink, InstanceState, InventoryHeartbeat, SideCallDispatcher,
};
