use serde_json::{Map, Value, json};

use crate::error::{ComputeError, Result};

/// Top-level keys a public placeholder may carry. Everything else is operational.
const PLACEHOLDER_KEYS: [&str; 3] = ["version", "type", "logistics"];

/// Build the public stand-in for a confidential definition.
///
/// Keeps the declared external-listen logistics and the trigger metadata so the
/// node knows to wait for the real definition; drops every op and all other
/// fields. Definitions without logistics get an api-listen declaration.
pub fn build_placeholder(definition: &Value) -> Result<Value> {
    let Some(source) = definition.as_object() else {
        return Err(ComputeError::InvalidDefinition(
            "job definition must be a JSON object".to_string(),
        ));
    };

    let mut placeholder = Map::new();
    for key in PLACEHOLDER_KEYS {
        if let Some(value) = source.get(key) {
            placeholder.insert(key.to_string(), value.clone());
        }
    }
    placeholder
        .entry("logistics")
        .or_insert_with(api_listen_logistics);

    let mut meta = Map::new();
    if let Some(trigger) = source.get("meta").and_then(|meta| meta.get("trigger")) {
        meta.insert("trigger".to_string(), trigger.clone());
    }
    placeholder.insert("meta".to_string(), Value::Object(meta));
    placeholder.insert("ops".to_string(), Value::Array(Vec::new()));
    Ok(Value::Object(placeholder))
}

fn api_listen_logistics() -> Value {
    json!({
        "send": { "type": "api-listen" },
        "receive": { "type": "api-listen" }
    })
}
