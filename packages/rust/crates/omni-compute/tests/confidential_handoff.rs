//! Handoff against a mock node: push after RUNNING, re-auth on 4xx, abort on early termination.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use omni_compute::{
    AuthProvider, ComputeError, ExtendReceipt, HandoffConfig, HandoffOutcome, JobSnapshot,
    JobState, Marketplace, MessageSigningService, NodeClient, NodeEndpoints, PostedJob,
    RetryPolicy, SignedMessage, StopReceipt, run_handoff,
};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct NodeState {
    reject_first: usize,
    requests: Arc<AtomicUsize>,
    definitions: Arc<Mutex<Vec<(String, Value)>>>,
    auth_headers: Arc<Mutex<Vec<String>>>,
}

async fn handle_job_definition(
    State(state): State<NodeState>,
    Path(job): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let request = state.requests.fetch_add(1, Ordering::SeqCst) + 1;
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.auth_headers.lock().expect("headers lock").push(auth);
    if request <= state.reject_first {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "signature expired" })),
        );
    }
    state
        .definitions
        .lock()
        .expect("definitions lock")
        .push((job, body));
    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn handle_results(Path(job): Path<String>) -> Json<Value> {
    Json(json!({ "job": job, "status": "done" }))
}

async fn spawn_mock_node(state: NodeState) -> Result<Option<String>> {
    let app = Router::new()
        .route("/job/{job}/job-definition", post(handle_job_definition))
        .route("/job/{job}/results", get(handle_results))
        .with_state(state);
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping handoff tests: local socket bind is not permitted");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(Some(format!("http://{addr}")))
}

/// Marketplace that reports a scripted state sequence for every read.
struct ScriptedMarketplace {
    states: Mutex<Vec<JobState>>,
    reads: AtomicUsize,
}

impl ScriptedMarketplace {
    fn new(states: Vec<JobState>) -> Self {
        Self {
            states: Mutex::new(states),
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Marketplace for ScriptedMarketplace {
    async fn post_job(&self, _content_ref: &str, _market: &str) -> omni_compute::Result<PostedJob> {
        Err(ComputeError::Unsupported("post".to_string()))
    }

    async fn get_job(&self, address: &str) -> omni_compute::Result<JobSnapshot> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut states = self.states.lock().expect("states lock");
        let state = if states.len() > 1 {
            states.remove(0)
        } else {
            states.first().cloned().unwrap_or(JobState::Queued)
        };
        let node = (state == JobState::Running).then(|| "node-1".to_string());
        Ok(JobSnapshot {
            address: address.to_string(),
            state,
            node,
            definition_ref: None,
            result_ref: None,
            owner: None,
            price: None,
            market: None,
            time_start: None,
            timeout_secs: None,
        })
    }

    async fn stop_job(&self, _address: &str) -> omni_compute::Result<StopReceipt> {
        Err(ComputeError::Unsupported("stop".to_string()))
    }

    async fn extend_job(&self, _address: &str, _seconds: u64) -> omni_compute::Result<ExtendReceipt> {
        Err(ComputeError::Unsupported("extend".to_string()))
    }

    async fn pin_blob(&self, _value: &Value) -> omni_compute::Result<String> {
        Err(ComputeError::Unsupported("pin".to_string()))
    }

    async fn retrieve_blob(&self, _content_ref: &str) -> omni_compute::Result<Value> {
        Err(ComputeError::Unsupported("retrieve".to_string()))
    }
}

struct CountingSigner {
    calls: AtomicUsize,
}

#[async_trait]
impl MessageSigningService for CountingSigner {
    async fn sign_message(&self, message: &str) -> omni_compute::Result<SignedMessage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SignedMessage {
            signature: format!("sig-{call}"),
            message: message.to_string(),
            owner_identity: "owner".to_string(),
        })
    }
}

fn fast_handoff() -> HandoffConfig {
    HandoffConfig {
        poll_interval: Duration::from_millis(10),
        max_polls: 20,
        read_retry: RetryPolicy::new(3, Duration::from_millis(5)),
    }
}

fn node_client(base_url: &str, signer: Arc<CountingSigner>) -> NodeClient {
    let endpoints = NodeEndpoints {
        http_url_template: base_url.to_string(),
        ws_url_template: base_url.replace("http://", "ws://"),
    };
    NodeClient::new(
        endpoints,
        Arc::new(AuthProvider::delegated(signer, "Hello")),
        5,
    )
}

fn secret_definition() -> Value {
    json!({
        "version": "0.1",
        "type": "container",
        "ops": [{ "id": "svc", "args": { "image": "private/image", "cmd": ["run"], "expose": 8080 } }],
    })
}

#[tokio::test]
async fn definition_is_pushed_once_the_job_runs() -> Result<()> {
    let state = NodeState::default();
    let Some(base_url) = spawn_mock_node(state.clone()).await? else {
        return Ok(());
    };
    let signer = Arc::new(CountingSigner {
        calls: AtomicUsize::new(0),
    });
    let marketplace =
        ScriptedMarketplace::new(vec![JobState::Queued, JobState::Queued, JobState::Running]);
    let client = node_client(&base_url, Arc::clone(&signer));

    let outcome = run_handoff(
        &marketplace,
        &client,
        "job-1",
        &secret_definition(),
        "svc.example",
        &fast_handoff(),
    )
    .await?;

    let HandoffOutcome::Delivered { node, service_url } = outcome else {
        panic!("expected delivery, got {outcome:?}");
    };
    assert_eq!(node, "node-1");
    let service_url = service_url.expect("exposed port resolves");
    assert!(service_url.ends_with(".svc.example"));
    assert_eq!(marketplace.reads.load(Ordering::SeqCst), 3);

    let definitions = state.definitions.lock().expect("definitions lock").clone();
    assert_eq!(definitions, vec![("job-1".to_string(), secret_definition())]);
    assert_eq!(
        state.auth_headers.lock().expect("headers lock").clone(),
        vec!["Hello:sig-1".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn rejected_push_reauthenticates_exactly_once() -> Result<()> {
    let state = NodeState {
        reject_first: 1,
        ..NodeState::default()
    };
    let Some(base_url) = spawn_mock_node(state.clone()).await? else {
        return Ok(());
    };
    let signer = Arc::new(CountingSigner {
        calls: AtomicUsize::new(0),
    });
    let marketplace = ScriptedMarketplace::new(vec![JobState::Running]);
    let client = node_client(&base_url, Arc::clone(&signer));

    let outcome = run_handoff(
        &marketplace,
        &client,
        "job-2",
        &secret_definition(),
        "svc.example",
        &fast_handoff(),
    )
    .await?;

    assert!(matches!(outcome, HandoffOutcome::Delivered { .. }));
    assert_eq!(state.requests.load(Ordering::SeqCst), 2);
    assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        state.auth_headers.lock().expect("headers lock").clone(),
        vec!["Hello:sig-1".to_string(), "Hello:sig-2".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn second_rejection_is_surfaced() -> Result<()> {
    let state = NodeState {
        reject_first: 5,
        ..NodeState::default()
    };
    let Some(base_url) = spawn_mock_node(state.clone()).await? else {
        return Ok(());
    };
    let signer = Arc::new(CountingSigner {
        calls: AtomicUsize::new(0),
    });
    let marketplace = ScriptedMarketplace::new(vec![JobState::Running]);
    let client = node_client(&base_url, signer);

    let error = run_handoff(
        &marketplace,
        &client,
        "job-3",
        &secret_definition(),
        "svc.example",
        &fast_handoff(),
    )
    .await
    .expect_err("node keeps rejecting");

    assert!(matches!(error, ComputeError::NodeRejected { status: 401, .. }));
    assert_eq!(state.requests.load(Ordering::SeqCst), 2);
    assert!(state.definitions.lock().expect("definitions lock").is_empty());
    Ok(())
}

#[tokio::test]
async fn terminal_state_before_running_aborts_without_push() -> Result<()> {
    let state = NodeState::default();
    let Some(base_url) = spawn_mock_node(state.clone()).await? else {
        return Ok(());
    };
    let signer = Arc::new(CountingSigner {
        calls: AtomicUsize::new(0),
    });
    let marketplace = ScriptedMarketplace::new(vec![JobState::Queued, JobState::Stopped]);
    let client = node_client(&base_url, Arc::clone(&signer));

    let outcome = run_handoff(
        &marketplace,
        &client,
        "job-4",
        &secret_definition(),
        "svc.example",
        &fast_handoff(),
    )
    .await?;

    assert_eq!(outcome, HandoffOutcome::Aborted(JobState::Stopped));
    assert_eq!(state.requests.load(Ordering::SeqCst), 0);
    assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn job_that_never_runs_times_out() -> Result<()> {
    let state = NodeState::default();
    let Some(base_url) = spawn_mock_node(state.clone()).await? else {
        return Ok(());
    };
    let signer = Arc::new(CountingSigner {
        calls: AtomicUsize::new(0),
    });
    let marketplace = ScriptedMarketplace::new(vec![JobState::Queued]);
    let client = node_client(&base_url, signer);
    let config = HandoffConfig {
        max_polls: 4,
        ..fast_handoff()
    };

    let error = run_handoff(
        &marketplace,
        &client,
        "job-5",
        &secret_definition(),
        "svc.example",
        &config,
    )
    .await
    .expect_err("handoff times out");

    assert!(matches!(error, ComputeError::HandoffTimeout(ref job) if job == "job-5"));
    assert_eq!(marketplace.reads.load(Ordering::SeqCst), 4);
    assert_eq!(state.requests.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn node_results_are_fetched_with_auth() -> Result<()> {
    let state = NodeState::default();
    let Some(base_url) = spawn_mock_node(state).await? else {
        return Ok(());
    };
    let signer = Arc::new(CountingSigner {
        calls: AtomicUsize::new(0),
    });
    let client = node_client(&base_url, signer);
    let results = client.fetch_results("node-1", "job-6").await?;
    let expected: HashMap<String, String> = [
        ("job".to_string(), "job-6".to_string()),
        ("status".to_string(), "done".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(serde_json::from_value::<HashMap<String, String>>(results)?, expected);
    Ok(())
}
