use std::path::Path;

use anyhow::{Context, bail};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde_json::json;

use omni_compute::{ComputeSettings, Marketplace};

use crate::controller_builder::build_clients;

use super::print_json;

pub(crate) async fn run_balance_mode(settings: &ComputeSettings) -> anyhow::Result<()> {
    let clients = build_clients(settings)?;
    let balance = clients.marketplace.credit_balance().await?;
    print_json(&json!({
        "assigned": balance.assigned_credits,
        "reserved": balance.reserved_credits,
        "settled": balance.settled_credits,
        "available": balance.available(),
    }))
}

pub(crate) fn run_keygen_mode(out: &Path, force: bool) -> anyhow::Result<()> {
    if out.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", out.display());
    }
    let signing_key = SigningKey::generate(&mut OsRng);
    let keypair = signing_key.to_keypair_bytes();
    if let Some(parent) = out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(out, serde_json::to_string(&keypair.to_vec())?)
        .with_context(|| format!("failed to write {}", out.display()))?;
    print_json(&json!({
        "identity": hex::encode(signing_key.verifying_key().as_bytes()),
        "path": out.display().to_string(),
    }))
}
