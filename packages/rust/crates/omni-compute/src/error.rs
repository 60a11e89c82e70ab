//! Error types for compute lifecycle operations.
//!
//! Follows ODF-EP: Explicit error enums with context.

use reqwest::StatusCode;
use thiserror::Error;

/// Compute-controller errors.
#[derive(Error, Debug)]
pub enum ComputeError {
    /// No signing capability is configured for the requested auth mode.
    #[error("Auth unavailable: {0}")]
    AuthUnavailable(String),

    /// The posted job never resolved to a job address.
    #[error("Launch timed out: {0}")]
    LaunchTimeout(String),

    /// The job never reached RUNNING inside the handoff polling budget.
    #[error("Handoff timed out for job {0}")]
    HandoffTimeout(String),

    /// Upstream signalled rate limiting (HTTP 429).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The node answered a confidential request with a 4xx status.
    #[error("Node rejected request (status {status}): {body}")]
    NodeRejected {
        /// HTTP status returned by the node.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// A streaming socket did not finish connecting in time.
    #[error("Connection timed out after {0}s")]
    ConnectionTimeout(u64),

    /// Capability not offered by the active marketplace client.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Neither a public result blob nor a reachable node holds the results.
    #[error("Results unavailable for job {0}")]
    ResultsUnavailable(String),

    /// Non-success response from an HTTP API.
    #[error("API error (status {status}): {body}")]
    Api {
        /// HTTP status returned by the API.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Websocket failure.
    #[error("Socket error: {0}")]
    Socket(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job definition does not have the expected shape.
    #[error("Invalid job definition: {0}")]
    InvalidDefinition(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ComputeError {
    /// Map a non-success HTTP status into the matching variant.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let body = truncate_body(body, 512);
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Self::RateLimited(body);
        }
        Self::Api {
            status: status.as_u16(),
            body,
        }
    }

    /// Whether this failure signals upstream rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Api { status, .. } | Self::NodeRejected { status, .. } => *status == 429,
            Self::Http(error) => error
                .status()
                .is_some_and(|status| status == StatusCode::TOO_MANY_REQUESTS),
            other => other.to_string().contains("Too Many Requests"),
        }
    }
}

/// Result type for compute operations.
pub type Result<T> = std::result::Result<T, ComputeError>;

pub(crate) fn truncate_body(text: &str, max_chars: usize) -> String {
    let mut iter = text.chars();
    let truncated: String = iter.by_ref().take(max_chars).collect();
    if iter.next().is_some() {
        format!("{truncated}...")
    } else {
        truncated
    }
}
