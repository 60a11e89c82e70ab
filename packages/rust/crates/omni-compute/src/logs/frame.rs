use serde_json::{Value, json};

use super::LogStreamEvent;

/// Subscribe request sent right after the socket opens.
pub fn subscribe_message(job_address: &str, identity: &str, auth_header: &str) -> Value {
    json!({
        "path": "/log",
        "body": {
            "jobAddress": job_address,
            "address": identity,
        },
        "header": auth_header,
    })
}

/// Classify one text frame from the node.
///
/// `path == "log"` envelopes carry the log record in `body`, either inline or
/// as a JSON string. Envelopes with an `error` field become errors. Anything
/// else is passed through untouched.
pub fn parse_frame(text: &str) -> LogStreamEvent {
    let Ok(envelope) = serde_json::from_str::<Value>(text) else {
        return LogStreamEvent::Raw(text.to_string());
    };

    if envelope.get("path").and_then(Value::as_str) == Some("log") {
        return match envelope.get("body") {
            Some(Value::String(body)) => match serde_json::from_str::<Value>(body) {
                Ok(payload) => LogStreamEvent::Log(payload),
                Err(_) => LogStreamEvent::Raw(body.clone()),
            },
            Some(payload) => LogStreamEvent::Log(payload.clone()),
            None => LogStreamEvent::Raw(text.to_string()),
        };
    }

    match envelope.get("error") {
        Some(Value::String(message)) => LogStreamEvent::Error(message.clone()),
        Some(Value::Null) | None => LogStreamEvent::Raw(text.to_string()),
        Some(other) => LogStreamEvent::Error(other.to_string()),
    }
}
