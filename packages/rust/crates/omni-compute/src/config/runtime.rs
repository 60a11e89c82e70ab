//! Resolve merged settings into the runtime configuration of each component.

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{AuthMode, DEFAULT_AUTH_CHALLENGE};
use crate::controller::ControllerConfig;
use crate::error::{ComputeError, Result};
use crate::logs::LogStreamConfig;
use crate::node::NodeEndpoints;

use super::settings::{ComputeSettings, absolutize, project_root};

/// Env var holding the delegated API key; wins over the settings file.
pub const API_KEY_ENV: &str = "OMNI_COMPUTE_API_KEY";
/// Env var holding the audit sink key; wins over the settings file.
pub const AUDIT_API_KEY_ENV: &str = "OMNI_COMPUTE_AUDIT_API_KEY";

pub const DEFAULT_API_URL: &str = "https://dashboard.k8s.prd.nos.ci/api";
pub const DEFAULT_PIN_URL: &str = "https://api.pinata.cloud/pinning/pinJSONToIPFS";
pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.pinata.cloud/ipfs";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

impl ComputeSettings {
    pub fn controller_config(&self) -> ControllerConfig {
        let defaults = ControllerConfig::default();
        let watch = &self.watch;
        ControllerConfig {
            provider: non_empty(self.orchestrator.provider.as_deref())
                .unwrap_or(defaults.provider),
            tick_interval: watch
                .tick_interval_secs
                .filter(|secs| *secs > 0)
                .map_or(defaults.tick_interval, Duration::from_secs),
            heartbeat_interval: watch
                .heartbeat_interval_secs
                .map_or(defaults.heartbeat_interval, Duration::from_secs),
            extend_threshold_secs: watch
                .extend_threshold_secs
                .unwrap_or(defaults.extend_threshold_secs),
            extend_by_secs: watch.extend_by_secs.unwrap_or(defaults.extend_by_secs),
            min_runtime_for_redeploy_secs: watch
                .min_runtime_for_redeploy_secs
                .unwrap_or(defaults.min_runtime_for_redeploy_secs),
            service_domain: non_empty(self.node.service_domain.as_deref())
                .unwrap_or(defaults.service_domain),
            max_in_flight_side_calls: watch
                .max_in_flight_side_calls
                .unwrap_or(defaults.max_in_flight_side_calls),
            ..defaults
        }
    }

    pub fn node_endpoints(&self) -> NodeEndpoints {
        let defaults = NodeEndpoints::default();
        NodeEndpoints {
            http_url_template: non_empty(self.node.http_url_template.as_deref())
                .unwrap_or(defaults.http_url_template),
            ws_url_template: non_empty(self.node.ws_url_template.as_deref())
                .unwrap_or(defaults.ws_url_template),
        }
    }

    pub fn log_stream_config(&self) -> LogStreamConfig {
        let defaults = LogStreamConfig::default();
        LogStreamConfig {
            reconnect_delay: self
                .logs
                .reconnect_delay_secs
                .map_or(defaults.reconnect_delay, Duration::from_secs),
            max_reconnect_attempts: self
                .logs
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            connect_timeout: self
                .logs
                .connect_timeout_secs
                .filter(|secs| *secs > 0)
                .map_or(defaults.connect_timeout, Duration::from_secs),
        }
    }

    /// Auth mode; defaults to delegated when an API key is available, else offline.
    pub fn auth_mode(&self, api_key_available: bool) -> Result<AuthMode> {
        match self.auth.mode.as_deref().map(str::trim) {
            None | Some("") => Ok(if api_key_available {
                AuthMode::Delegated
            } else {
                AuthMode::Offline
            }),
            Some(mode) if mode.eq_ignore_ascii_case("offline") => Ok(AuthMode::Offline),
            Some(mode) if mode.eq_ignore_ascii_case("delegated") => Ok(AuthMode::Delegated),
            Some(other) => Err(ComputeError::Config(format!(
                "auth.mode must be `offline` or `delegated`, got `{other}`"
            ))),
        }
    }

    pub fn challenge(&self) -> String {
        non_empty(self.auth.challenge.as_deref()).unwrap_or_else(|| DEFAULT_AUTH_CHALLENGE.to_string())
    }

    /// Key file path, relative paths resolved against `PRJ_ROOT`/cwd.
    pub fn key_path(&self) -> Option<PathBuf> {
        non_empty(self.auth.key_path.as_deref())
            .map(|path| absolutize(&project_root(), PathBuf::from(path)))
    }

    pub fn api_url(&self) -> String {
        non_empty(self.marketplace.api_url.as_deref()).unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn pin_url(&self) -> String {
        non_empty(self.marketplace.pin_url.as_deref()).unwrap_or_else(|| DEFAULT_PIN_URL.to_string())
    }

    pub fn gateway_url(&self) -> String {
        non_empty(self.marketplace.gateway_url.as_deref())
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string())
    }

    pub fn marketplace_timeout_secs(&self) -> u64 {
        self.marketplace
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    pub fn node_timeout_secs(&self) -> u64 {
        self.node
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    /// Delegated API key: env first, then settings.
    pub fn api_key(&self) -> Option<String> {
        env_secret(API_KEY_ENV).or_else(|| non_empty(self.marketplace.api_key.as_deref()))
    }

    /// Audit sink key: env first, then settings.
    pub fn audit_api_key(&self) -> Option<String> {
        env_secret(AUDIT_API_KEY_ENV).or_else(|| non_empty(self.audit.api_key.as_deref()))
    }

    pub fn recover_on_start(&self) -> bool {
        self.watch.recover_on_start.unwrap_or(true)
    }
}

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
