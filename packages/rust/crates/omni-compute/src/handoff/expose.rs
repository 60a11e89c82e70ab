use serde_json::Value;
use sha2::{Digest, Sha256};

/// Public service domain for exposed ports when none is configured.
pub const DEFAULT_SERVICE_DOMAIN: &str = "node.k8s.prd.nos.ci";

const EXPOSE_HASH_CHARS: usize = 32;

/// Service URLs for every port exposed by the definition, in op order.
pub fn resolve_service_urls(job_address: &str, definition: &Value, service_domain: &str) -> Vec<String> {
    let Some(ops) = definition.get("ops").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut urls = Vec::new();
    for (op_index, op) in ops.iter().enumerate() {
        let Some(expose) = op.get("args").and_then(|args| args.get("expose")) else {
            continue;
        };
        for port in exposed_ports(expose) {
            let hash = expose_hash(job_address, op_index, port);
            urls.push(format!("https://{hash}.{service_domain}"));
        }
    }
    urls
}

fn exposed_ports(expose: &Value) -> Vec<u64> {
    match expose {
        Value::Number(port) => port.as_u64().into_iter().collect(),
        Value::String(port) => port.trim().parse().ok().into_iter().collect(),
        Value::Object(entry) => entry
            .get("port")
            .map(exposed_ports)
            .unwrap_or_default(),
        Value::Array(entries) => entries.iter().flat_map(exposed_ports).collect(),
        _ => Vec::new(),
    }
}

fn expose_hash(job_address: &str, op_index: usize, port: u64) -> String {
    let digest = Sha256::digest(format!("{job_address}:{op_index}:{port}").as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(EXPOSE_HASH_CHARS);
    hash
}
