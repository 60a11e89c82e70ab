use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::Result;

use super::AuthResult;

/// How long a delegated signature is reused for the same message.
pub const SIGNATURE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Response of the remote signing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignedMessage {
    pub signature: String,
    pub message: String,
    /// Address of the managed account that signed.
    #[serde(rename = "userAddress")]
    pub owner_identity: String,
}

/// Remote service that signs a message on behalf of a managed account.
#[async_trait]
pub trait MessageSigningService: Send + Sync {
    async fn sign_message(&self, message: &str) -> Result<SignedMessage>;
}

#[derive(Debug, Clone)]
struct CachedSignature {
    signed: SignedMessage,
    cached_at: Instant,
}

/// Signs through a remote service, caching the result per message.
pub struct DelegatedSigner {
    service: Arc<dyn MessageSigningService>,
    challenge: String,
    cache: Mutex<Option<CachedSignature>>,
}

impl DelegatedSigner {
    pub fn new(service: Arc<dyn MessageSigningService>, challenge: &str) -> Self {
        Self {
            service,
            challenge: challenge.to_string(),
            cache: Mutex::new(None),
        }
    }

    pub(super) async fn produce(&self) -> Result<AuthResult> {
        if let Some(signed) = self.cached_for(&self.challenge) {
            return Ok(auth_result(&signed));
        }

        let signed = self.service.sign_message(&self.challenge).await?;
        tracing::debug!(
            event = "compute.auth.delegated.signed",
            identity = %signed.owner_identity,
            "delegated signature refreshed"
        );
        let result = auth_result(&signed);
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedSignature {
            signed,
            cached_at: Instant::now(),
        });
        Ok(result)
    }

    /// Check and read under one lock so an expired entry is never handed out.
    fn cached_for(&self, message: &str) -> Option<SignedMessage> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.as_ref()?;
        if entry.signed.message != message || entry.cached_at.elapsed() >= SIGNATURE_CACHE_TTL {
            *cache = None;
            return None;
        }
        Some(entry.signed.clone())
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.take().is_some() {
            tracing::debug!(
                event = "compute.auth.delegated.cache_cleared",
                "delegated signature cache cleared"
            );
        }
    }

    pub fn cached_identity(&self) -> Option<String> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .map(|entry| entry.signed.owner_identity.clone())
    }
}

fn auth_result(signed: &SignedMessage) -> AuthResult {
    AuthResult {
        header_value: format!("{}:{}", signed.message, signed.signature),
        identity: signed.owner_identity.clone(),
    }
}
