use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use omni_compute::{
    AuditSink, AuthMode, AuthProvider, ComputeSettings, ControllerDeps, DelegatedApiClient,
    DisabledSink, HeartbeatSink, HttpAuditSink, HttpHeartbeatSink, JobLifecycleController,
    LogStreamClient, MessageSigningService, NodeClient, PinningContentStore, WatchRegistry,
    load_signing_key,
};

/// Clients shared by every command.
pub(crate) struct ComputeClients {
    pub(crate) marketplace: Arc<DelegatedApiClient>,
    pub(crate) auth: Arc<AuthProvider>,
    pub(crate) node_client: Arc<NodeClient>,
}

pub(crate) fn build_clients(settings: &ComputeSettings) -> Result<ComputeClients> {
    let api_key = settings.api_key().ok_or_else(|| {
        anyhow!(
            "delegated api key missing: set {} or marketplace.api_key",
            omni_compute::API_KEY_ENV
        )
    })?;
    let content_store = PinningContentStore::new(
        &settings.pin_url(),
        settings.marketplace.pin_token.clone(),
        &settings.gateway_url(),
        settings.marketplace_timeout_secs(),
    );
    let marketplace = Arc::new(DelegatedApiClient::new(
        &settings.api_url(),
        &api_key,
        content_store,
        settings.marketplace_timeout_secs(),
    ));

    let auth = match settings.auth_mode(true)? {
        AuthMode::Offline => {
            let key = settings
                .key_path()
                .map(|path| {
                    load_signing_key(&path)
                        .with_context(|| format!("failed to load key {}", path.display()))
                })
                .transpose()?;
            AuthProvider::offline(key, &settings.challenge())
        }
        AuthMode::Delegated => {
            let signer: Arc<dyn MessageSigningService> = marketplace.clone();
            AuthProvider::delegated(signer, &settings.challenge())
        }
    };
    let auth = Arc::new(auth);
    let node_client = Arc::new(NodeClient::new(
        settings.node_endpoints(),
        Arc::clone(&auth),
        settings.node_timeout_secs(),
    ));

    Ok(ComputeClients {
        marketplace,
        auth,
        node_client,
    })
}

pub(crate) fn build_controller(
    clients: &ComputeClients,
    settings: &ComputeSettings,
) -> Arc<JobLifecycleController> {
    let timeout_secs = settings.marketplace_timeout_secs();
    let heartbeat_sink: Arc<dyn HeartbeatSink> = match settings.orchestrator.url.as_deref() {
        Some(url) if !url.trim().is_empty() => Arc::new(HttpHeartbeatSink::new(url, timeout_secs)),
        _ => Arc::new(DisabledSink),
    };
    let audit_sink: Arc<dyn AuditSink> = match settings.audit.url.as_deref() {
        Some(url) if !url.trim().is_empty() => Arc::new(HttpAuditSink::new(
            url,
            settings.audit_api_key(),
            timeout_secs,
        )),
        _ => Arc::new(DisabledSink),
    };

    JobLifecycleController::start(
        ControllerDeps {
            marketplace: clients.marketplace.clone(),
            auth: Arc::clone(&clients.auth),
            node_client: Arc::clone(&clients.node_client),
            heartbeat_sink,
            audit_sink,
            registry: WatchRegistry::new(),
        },
        settings.controller_config(),
    )
}

pub(crate) fn build_log_client(
    clients: &ComputeClients,
    settings: &ComputeSettings,
) -> LogStreamClient {
    LogStreamClient::new(
        settings.node_endpoints(),
        Arc::clone(&clients.auth),
        settings.log_stream_config(),
    )
}
