//! Authentication header production for node-facing requests.
//!
//! Two strategies sit behind one [`AuthProvider`]:
//! - [`OfflineSigner`]: a locally held Ed25519 key signs the challenge.
//! - [`DelegatedSigner`]: a remote signing service signs on behalf of a managed
//!   account; results are cached per message for five minutes.
//!
//! The strategy is fixed when the provider is built and never re-selected per call.

mod delegated;
mod offline;

use std::sync::Arc;

pub use delegated::{DelegatedSigner, MessageSigningService, SIGNATURE_CACHE_TTL, SignedMessage};
pub use offline::{OfflineSigner, load_signing_key};

use crate::error::Result;

/// Challenge signed when no override is configured.
pub const DEFAULT_AUTH_CHALLENGE: &str = "Hello Compute Node!";

/// Signed header plus the identity that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// Value sent in the node `Authorization` header: `<challenge>:<signature>`.
    pub header_value: String,
    /// Address of the signing identity.
    pub identity: String,
}

/// Auth mode label used in logs and settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Local key.
    Offline,
    /// Remote signing service.
    Delegated,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Delegated => "delegated",
        }
    }
}

/// Auth strategy chosen once at construction.
pub enum AuthProvider {
    /// Local signing identity.
    Offline(OfflineSigner),
    /// Delegated signing service.
    Delegated(DelegatedSigner),
}

impl AuthProvider {
    /// Build an offline provider; `None` yields a provider that fails with `AuthUnavailable`.
    pub fn offline(signer: Option<ed25519_dalek::SigningKey>, challenge: &str) -> Self {
        Self::Offline(OfflineSigner::new(signer, challenge))
    }

    /// Build a delegated provider backed by `service`.
    pub fn delegated(service: Arc<dyn MessageSigningService>, challenge: &str) -> Self {
        Self::Delegated(DelegatedSigner::new(service, challenge))
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            Self::Offline(_) => AuthMode::Offline,
            Self::Delegated(_) => AuthMode::Delegated,
        }
    }

    /// Produce a signed header for the configured challenge.
    pub async fn produce(&self) -> Result<AuthResult> {
        match self {
            Self::Offline(signer) => signer.produce(),
            Self::Delegated(signer) => signer.produce().await,
        }
    }

    /// Drop any cached signature so the next `produce` goes back to the signer.
    ///
    /// Called after a node answers with a 4xx. No-op for the offline strategy.
    pub fn clear_cache(&self) {
        if let Self::Delegated(signer) = self {
            signer.clear_cache();
        }
    }

    /// Best known identity address without a network round trip.
    pub fn identity(&self) -> Option<String> {
        match self {
            Self::Offline(signer) => signer.identity(),
            Self::Delegated(signer) => signer.cached_identity(),
        }
    }
}
