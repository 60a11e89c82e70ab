//! Config namespace: YAML settings and their runtime resolution.

mod runtime;
mod settings;

pub use runtime::{
    API_KEY_ENV, AUDIT_API_KEY_ENV, DEFAULT_API_URL, DEFAULT_GATEWAY_URL, DEFAULT_PIN_URL,
};
pub use settings::{
    AuditSettings, AuthSettings, ComputeSettings, LogSettings, MarketplaceSettings, NodeSettings,
    OrchestratorSettings, WatchSettings, compute_settings_paths, load_compute_settings,
    load_compute_settings_from_paths, set_config_home_override,
};
