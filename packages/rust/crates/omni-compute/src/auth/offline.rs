use std::path::Path;

use ed25519_dalek::{Signer, SigningKey};

use crate::error::{ComputeError, Result};

use super::AuthResult;

/// Signs the auth challenge with a locally held Ed25519 key.
pub struct OfflineSigner {
    signing_key: Option<SigningKey>,
    challenge: String,
}

impl OfflineSigner {
    pub fn new(signing_key: Option<SigningKey>, challenge: &str) -> Self {
        Self {
            signing_key,
            challenge: challenge.to_string(),
        }
    }

    pub fn identity(&self) -> Option<String> {
        self.signing_key
            .as_ref()
            .map(|key| hex::encode(key.verifying_key().as_bytes()))
    }

    pub(super) fn produce(&self) -> Result<AuthResult> {
        let Some(signing_key) = self.signing_key.as_ref() else {
            return Err(ComputeError::AuthUnavailable(
                "no local signing identity configured".to_string(),
            ));
        };
        let signature = signing_key.sign(self.challenge.as_bytes());
        Ok(AuthResult {
            header_value: format!("{}:{}", self.challenge, hex::encode(signature.to_bytes())),
            identity: hex::encode(signing_key.verifying_key().as_bytes()),
        })
    }
}

/// Load an Ed25519 signing key from a keypair file.
///
/// Accepts a JSON byte array (32-byte seed or 64-byte seed+public keypair) or
/// a hex string of the 32-byte seed.
pub fn load_signing_key(path: &Path) -> Result<SigningKey> {
    let raw = std::fs::read_to_string(path).map_err(|error| {
        ComputeError::Config(format!("failed to read key file {}: {error}", path.display()))
    })?;
    parse_signing_key(raw.trim())
}

fn parse_signing_key(raw: &str) -> Result<SigningKey> {
    let bytes: Vec<u8> = if raw.starts_with('[') {
        serde_json::from_str(raw)?
    } else {
        hex::decode(raw)
            .map_err(|error| ComputeError::Config(format!("invalid hex key: {error}")))?
    };
    if bytes.len() != 32 && bytes.len() != 64 {
        return Err(ComputeError::Config(format!(
            "key must be 32 or 64 bytes, got {}",
            bytes.len()
        )));
    }
    let mut seed = [0_u8; 32];
    seed.copy_from_slice(&bytes[..32]);
    Ok(SigningKey::from_bytes(&seed))
}
