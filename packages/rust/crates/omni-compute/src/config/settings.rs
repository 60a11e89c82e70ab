//! Settings loader for omni-compute.
//!
//! Loads and merges:
//! - System defaults: `<PRJ_ROOT>/packages/conf/compute.yaml`
//! - User overrides:  `<PRJ_CONFIG_HOME>/omni-compute/compute.yaml`
//!
//! Merge precedence is user over system.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;

const DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH: &str = "packages/conf/compute.yaml";
const DEFAULT_USER_SETTINGS_RELATIVE_PATH: &str = "omni-compute/compute.yaml";
const DEFAULT_CONFIG_HOME_RELATIVE_PATH: &str = ".config";
static CONFIG_HOME_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComputeSettings {
    #[serde(default)]
    pub marketplace: MarketplaceSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub audit: AuditSettings,
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(default)]
    pub logs: LogSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketplaceSettings {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub market: Option<String>,
    pub pin_url: Option<String>,
    pub pin_token: Option<String>,
    pub gateway_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    /// `offline` or `delegated`.
    pub mode: Option<String>,
    pub key_path: Option<String>,
    pub challenge: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeSettings {
    pub http_url_template: Option<String>,
    pub ws_url_template: Option<String>,
    pub service_domain: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorSettings {
    pub url: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchSettings {
    pub tick_interval_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub extend_threshold_secs: Option<u64>,
    pub extend_by_secs: Option<u64>,
    pub min_runtime_for_redeploy_secs: Option<u64>,
    pub max_in_flight_side_calls: Option<usize>,
    pub recover_on_start: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSettings {
    pub reconnect_delay_secs: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
}

impl ComputeSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            marketplace: self.marketplace.merge(overlay.marketplace),
            auth: self.auth.merge(overlay.auth),
            node: self.node.merge(overlay.node),
            orchestrator: self.orchestrator.merge(overlay.orchestrator),
            audit: self.audit.merge(overlay.audit),
            watch: self.watch.merge(overlay.watch),
            logs: self.logs.merge(overlay.logs),
        }
    }
}

impl MarketplaceSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            api_url: overlay.api_url.or(self.api_url),
            api_key: overlay.api_key.or(self.api_key),
            market: overlay.market.or(self.market),
            pin_url: overlay.pin_url.or(self.pin_url),
            pin_token: overlay.pin_token.or(self.pin_token),
            gateway_url: overlay.gateway_url.or(self.gateway_url),
            request_timeout_secs: overlay.request_timeout_secs.or(self.request_timeout_secs),
        }
    }
}

impl AuthSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            mode: overlay.mode.or(self.mode),
            key_path: overlay.key_path.or(self.key_path),
            challenge: overlay.challenge.or(self.challenge),
        }
    }
}

impl NodeSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            http_url_template: overlay.http_url_template.or(self.http_url_template),
            ws_url_template: overlay.ws_url_template.or(self.ws_url_template),
            service_domain: overlay.service_domain.or(self.service_domain),
            request_timeout_secs: overlay.request_timeout_secs.or(self.request_timeout_secs),
        }
    }
}

impl OrchestratorSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            url: overlay.url.or(self.url),
            provider: overlay.provider.or(self.provider),
        }
    }
}

impl AuditSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            url: overlay.url.or(self.url),
            api_key: overlay.api_key.or(self.api_key),
        }
    }
}

impl WatchSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            tick_interval_secs: overlay.tick_interval_secs.or(self.tick_interval_secs),
            heartbeat_interval_secs: overlay
                .heartbeat_interval_secs
                .or(self.heartbeat_interval_secs),
            extend_threshold_secs: overlay.extend_threshold_secs.or(self.extend_threshold_secs),
            extend_by_secs: overlay.extend_by_secs.or(self.extend_by_secs),
            min_runtime_for_redeploy_secs: overlay
                .min_runtime_for_redeploy_secs
                .or(self.min_runtime_for_redeploy_secs),
            max_in_flight_side_calls: overlay
                .max_in_flight_side_calls
                .or(self.max_in_flight_side_calls),
            recover_on_start: overlay.recover_on_start.or(self.recover_on_start),
        }
    }
}

impl LogSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            reconnect_delay_secs: overlay.reconnect_delay_secs.or(self.reconnect_delay_secs),
            max_reconnect_attempts: overlay
                .max_reconnect_attempts
                .or(self.max_reconnect_attempts),
            connect_timeout_secs: overlay.connect_timeout_secs.or(self.connect_timeout_secs),
        }
    }
}

/// Load merged compute settings (user overrides system).
pub fn load_compute_settings() -> ComputeSettings {
    let (system_path, user_path) = compute_settings_paths();
    load_compute_settings_from_paths(&system_path, &user_path)
}

#[doc(hidden)]
pub fn compute_settings_paths() -> (PathBuf, PathBuf) {
    let root = project_root();
    let system_path = root.join(DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH);
    let user_path = resolve_config_home(&root).join(DEFAULT_USER_SETTINGS_RELATIVE_PATH);
    (system_path, user_path)
}

#[doc(hidden)]
pub fn load_compute_settings_from_paths(system: &Path, user: &Path) -> ComputeSettings {
    load_one(system).merge(load_one(user))
}

fn load_one(path: &Path) -> ComputeSettings {
    if !path.exists() {
        return ComputeSettings::default();
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!(
                event = "compute.settings.read_failed",
                path = %path.display(),
                error = %error,
                "failed to read settings file; ignoring"
            );
            return ComputeSettings::default();
        }
    };
    match serde_yaml::from_str::<ComputeSettings>(&raw) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(
                event = "compute.settings.parse_failed",
                path = %path.display(),
                error = %error,
                "failed to parse settings yaml; ignoring file"
            );
            ComputeSettings::default()
        }
    }
}

pub(crate) fn project_root() -> PathBuf {
    std::env::var("PRJ_ROOT")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Set config-home override (used by CLI `--conf`).
///
/// The path can be absolute, or relative to `PRJ_ROOT`/cwd.
pub fn set_config_home_override(path: impl Into<PathBuf>) {
    let path = path.into();
    if path.as_os_str().is_empty() {
        return;
    }
    if CONFIG_HOME_OVERRIDE.set(path.clone()).is_err()
        && let Some(current) = CONFIG_HOME_OVERRIDE.get()
        && current != &path
    {
        tracing::warn!(
            event = "compute.settings.config_home_override_ignored",
            current = %current.display(),
            ignored = %path.display(),
            "config home override already set; ignoring subsequent value"
        );
    }
}

fn resolve_config_home(project_root: &Path) -> PathBuf {
    if let Some(path) = CONFIG_HOME_OVERRIDE.get() {
        return absolutize(project_root, path.clone());
    }

    let configured = std::env::var("PRJ_CONFIG_HOME")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_HOME_RELATIVE_PATH.to_string());
    absolutize(project_root, PathBuf::from(configured))
}

pub(crate) fn absolutize(project_root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        project_root.join(path)
    }
}
