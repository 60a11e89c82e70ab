#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use omni_compute::{
    AuditEvent, AuditSink, AuthProvider, ComputeError, ControllerConfig, ControllerDeps,
    ExtendReceipt, HeartbeatSink, InstanceState, InventoryHeartbeat, JobLifecycleController,
    JobSnapshot, JobState, LaunchRequest, Marketplace, NodeClient, NodeEndpoints, PostedJob,
    ResourceProfile, Result, StopReceipt, WatchRegistry, WatchedJob,
};
use serde_json::{Value, json};

#[derive(Default)]
struct MockMarketplace {
    jobs: Mutex<HashMap<String, JobSnapshot>>,
    blobs: Mutex<HashMap<String, Value>>,
    posted: Mutex<Vec<(String, String)>>,
    extends: Mutex<Vec<(String, u64)>>,
    stops: Mutex<Vec<String>>,
    listing: Mutex<Option<Vec<JobSnapshot>>>,
    deployment_only: bool,
    deployment_resolves_after: Option<usize>,
    deployment_polls: AtomicUsize,
    next_id: AtomicUsize,
    reject_posts: bool,
    failing_reads: AtomicUsize,
    reads: AtomicUsize,
}

impl MockMarketplace {
    fn set_job(&self, snapshot: JobSnapshot) {
        self.jobs
            .lock()
            .expect("jobs lock")
            .insert(snapshot.address.clone(), snapshot);
    }

    fn posted(&self) -> Vec<(String, String)> {
        self.posted.lock().expect("posted lock").clone()
    }

    fn extends(&self) -> Vec<(String, u64)> {
        self.extends.lock().expect("extends lock").clone()
    }

    fn pinned(&self, content_ref: &str) -> Option<Value> {
        self.blobs.lock().expect("blobs lock").get(content_ref).cloned()
    }
}

fn snapshot(address: &str, state: JobState) -> JobSnapshot {
    JobSnapshot {
        address: address.to_string(),
        state,
        node: None,
        definition_ref: None,
        result_ref: None,
        owner: None,
        price: None,
        market: Some("market-1".to_string()),
        time_start: None,
        timeout_secs: None,
    }
}

#[async_trait]
impl Marketplace for MockMarketplace {
    async fn post_job(&self, content_ref: &str, market: &str) -> Result<PostedJob> {
        if self.reject_posts {
            return Err(ComputeError::Api {
                status: 503,
                body: "market closed".to_string(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let address = format!("new-job-{id}");
        self.posted
            .lock()
            .expect("posted lock")
            .push((content_ref.to_string(), market.to_string()));
        self.set_job(snapshot(&address, JobState::Queued));
        if self.deployment_only {
            return Ok(PostedJob {
                tx: Some(format!("tx-{id}")),
                job_address: None,
                deployment_handle: Some(format!("deployment-{id}")),
                credits: None,
            });
        }
        Ok(PostedJob {
            tx: Some(format!("tx-{id}")),
            job_address: Some(address),
            deployment_handle: None,
            credits: Some(json!({ "reserved": 1.5 })),
        })
    }

    async fn resolve_deployment(&self, handle: &str) -> Result<Option<String>> {
        let polls = self.deployment_polls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.deployment_resolves_after {
            Some(after) if polls >= after => Ok(Some(handle.replace("deployment", "new-job"))),
            _ => Ok(None),
        }
    }

    async fn get_job(&self, address: &str) -> Result<JobSnapshot> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(ComputeError::Api {
                status: 500,
                body: "upstream unavailable".to_string(),
            });
        }
        self.jobs
            .lock()
            .expect("jobs lock")
            .get(address)
            .cloned()
            .ok_or_else(|| ComputeError::Api {
                status: 404,
                body: format!("job {address} not found"),
            })
    }

    async fn stop_job(&self, address: &str) -> Result<StopReceipt> {
        self.stops.lock().expect("stops lock").push(address.to_string());
        if let Some(job) = self.jobs.lock().expect("jobs lock").get_mut(address) {
            job.state = JobState::Stopped;
        }
        Ok(StopReceipt {
            tx: Some("stop-tx".to_string()),
            delisted: false,
        })
    }

    async fn extend_job(&self, address: &str, seconds: u64) -> Result<ExtendReceipt> {
        self.extends
            .lock()
            .expect("extends lock")
            .push((address.to_string(), seconds));
        if let Some(job) = self.jobs.lock().expect("jobs lock").get_mut(address) {
            job.timeout_secs = Some(job.timeout_secs.unwrap_or_default() + seconds);
        }
        Ok(ExtendReceipt {
            tx: Some("extend-tx".to_string()),
            credits: None,
        })
    }

    async fn pin_blob(&self, value: &Value) -> Result<String> {
        let mut blobs = self.blobs.lock().expect("blobs lock");
        let content_ref = format!("blob-{}", blobs.len() + 1);
        blobs.insert(content_ref.clone(), value.clone());
        Ok(content_ref)
    }

    async fn retrieve_blob(&self, content_ref: &str) -> Result<Value> {
        self.pinned(content_ref)
            .ok_or_else(|| ComputeError::Api {
                status: 404,
                body: "blob not found".to_string(),
            })
    }

    async fn list_all_jobs(&self) -> Result<Vec<JobSnapshot>> {
        self.listing
            .lock()
            .expect("listing lock")
            .clone()
            .ok_or_else(|| ComputeError::Unsupported("listing disabled".to_string()))
    }
}

#[derive(Default)]
struct RecordingSink {
    heartbeats: Mutex<Vec<InventoryHeartbeat>>,
    audits: Mutex<Vec<AuditEvent>>,
}

impl RecordingSink {
    fn heartbeats(&self) -> Vec<InventoryHeartbeat> {
        self.heartbeats.lock().expect("heartbeats lock").clone()
    }

    fn heartbeats_for(&self, address: &str) -> Vec<InventoryHeartbeat> {
        self.heartbeats()
            .into_iter()
            .filter(|heartbeat| heartbeat.provider_instance_id == address)
            .collect()
    }

    fn audits_for(&self, action: &str) -> Vec<AuditEvent> {
        self.audits
            .lock()
            .expect("audits lock")
            .iter()
            .filter(|event| event.action == action)
            .cloned()
            .collect()
    }

    fn audit_actions(&self) -> Vec<String> {
        self.audits
            .lock()
            .expect("audits lock")
            .iter()
            .map(|event| event.action.clone())
            .collect()
    }
}

#[async_trait]
impl HeartbeatSink for RecordingSink {
    async fn send_heartbeat(&self, heartbeat: &InventoryHeartbeat) -> Result<()> {
        self.heartbeats
            .lock()
            .expect("heartbeats lock")
            .push(heartbeat.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        self.audits.lock().expect("audits lock").push(event.clone());
        Ok(())
    }
}

struct Harness {
    controller: Arc<JobLifecycleController>,
    marketplace: Arc<MockMarketplace>,
    sink: Arc<RecordingSink>,
}

fn start_with(marketplace: MockMarketplace, auth: AuthProvider) -> Harness {
    let marketplace = Arc::new(marketplace);
    let sink = Arc::new(RecordingSink::default());
    let auth = Arc::new(auth);
    let node_client = Arc::new(NodeClient::new(
        NodeEndpoints::default(),
        Arc::clone(&auth),
        5,
    ));
    let controller = JobLifecycleController::start(
        ControllerDeps {
            marketplace: marketplace.clone(),
            auth,
            node_client,
            heartbeat_sink: sink.clone(),
            audit_sink: sink.clone(),
            registry: WatchRegistry::new(),
        },
        ControllerConfig::default(),
    );
    Harness {
        controller,
        marketplace,
        sink,
    }
}

fn start(marketplace: MockMarketplace) -> Harness {
    start_with(marketplace, AuthProvider::offline(None, "challenge"))
}

fn watched(address: &str, minutes_ago: i64, resources: ResourceProfile) -> WatchedJob {
    let mut job = WatchedJob::new(
        address,
        json!({ "version": "0.1", "type": "container", "ops": [{ "id": "run" }] }),
        "market-1",
        false,
        resources,
    );
    job.start_time = Utc::now() - chrono::Duration::minutes(minutes_ago);
    job.last_extend_time = job.start_time;
    job
}

/// Let watch ticks and detached side calls run on the paused clock.
async fn settle(duration: Duration) {
    let step = Duration::from_millis(500);
    let mut elapsed = Duration::ZERO;
    while elapsed < duration {
        tokio::time::sleep(step).await;
        elapsed += step;
    }
}

#[tokio::test(start_paused = true)]
async fn early_termination_reports_failed_and_never_redeploys() {
    let harness = start(MockMarketplace::default());
    harness
        .marketplace
        .set_job(snapshot("job-a", JobState::Stopped));
    assert!(
        harness
            .controller
            .adopt(watched("job-a", 5, ResourceProfile::default()))
            .await
    );

    settle(Duration::from_secs(5)).await;

    assert!(harness.controller.registry().is_empty().await);
    assert!(harness.marketplace.posted().is_empty());
    let heartbeats = harness.sink.heartbeats_for("job-a");
    assert_eq!(heartbeats.len(), 1, "heartbeats: {heartbeats:?}");
    assert_eq!(heartbeats[0].state, InstanceState::Failed);
    assert_eq!(heartbeats[0].health_score, 0);
    assert!(
        harness
            .sink
            .audit_actions()
            .contains(&"job.terminated".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn healthy_run_is_redeployed_once_with_same_resources() {
    let harness = start(MockMarketplace::default());
    let resources = ResourceProfile {
        gpu: 1,
        vcpu: 8,
        ram_gb: 32,
    };
    harness
        .marketplace
        .set_job(snapshot("job-b", JobState::Completed));
    harness
        .controller
        .adopt(watched("job-b", 45, resources))
        .await;

    settle(Duration::from_secs(300)).await;

    let posted = harness.marketplace.posted();
    assert_eq!(posted.len(), 1, "posted: {posted:?}");
    assert_eq!(posted[0].1, "market-1");

    let watched_jobs = harness.controller.watched_jobs().await;
    assert_eq!(watched_jobs.len(), 1);
    assert_eq!(watched_jobs[0].job_address, "new-job-1");
    assert_eq!(watched_jobs[0].resources, resources);

    let provisioning: Vec<_> = harness
        .sink
        .heartbeats()
        .into_iter()
        .filter(|heartbeat| heartbeat.state == InstanceState::Provisioning)
        .collect();
    assert_eq!(provisioning.len(), 1);
    assert_eq!(provisioning[0].provider_instance_id, "new-job-1");
    assert_eq!(
        provisioning[0].old_provider_instance_id.as_deref(),
        Some("job-b")
    );
    assert_eq!(provisioning[0].gpu_allocated, 1);
    assert_eq!(provisioning[0].vcpu_allocated, 8);
    assert_eq!(provisioning[0].ram_gb_allocated, 32);

    let old = harness.sink.heartbeats_for("job-b");
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].state, InstanceState::Terminated);
    assert_eq!(old[0].gpu_allocated, 0);
    assert_eq!(old[0].health_score, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_redeploy_reports_failed_then_releases_old_job() {
    let harness = start(MockMarketplace {
        reject_posts: true,
        ..MockMarketplace::default()
    });
    harness
        .marketplace
        .set_job(snapshot("job-r", JobState::Completed));
    harness
        .controller
        .adopt(watched("job-r", 45, ResourceProfile::default()))
        .await;

    settle(Duration::from_secs(5)).await;

    assert!(harness.controller.registry().is_empty().await);
    assert!(harness.marketplace.posted().is_empty());
    let states: Vec<InstanceState> = harness
        .sink
        .heartbeats_for("job-r")
        .into_iter()
        .map(|heartbeat| heartbeat.state)
        .collect();
    assert_eq!(states, vec![InstanceState::Failed, InstanceState::Terminated]);
    assert!(
        harness
            .sink
            .heartbeats()
            .iter()
            .all(|heartbeat| heartbeat.state != InstanceState::Provisioning)
    );
    let redeploys = harness.sink.audits_for("job.redeploy");
    assert_eq!(redeploys.len(), 1);
    assert_eq!(redeploys[0].status, "failure");
    assert!(redeploys[0].details["error"].is_string());
}

#[tokio::test(start_paused = true)]
async fn failed_tick_is_retried_on_the_next_tick() {
    let harness = start(MockMarketplace {
        failing_reads: AtomicUsize::new(1),
        ..MockMarketplace::default()
    });
    harness
        .marketplace
        .set_job(snapshot("job-t", JobState::Stopped));
    harness
        .controller
        .adopt(watched("job-t", 5, ResourceProfile::default()))
        .await;

    settle(Duration::from_secs(5)).await;
    assert!(harness.controller.registry().contains("job-t").await);
    assert!(harness.sink.heartbeats_for("job-t").is_empty());
    assert_eq!(harness.marketplace.reads.load(Ordering::SeqCst), 1);

    settle(Duration::from_secs(65)).await;
    assert!(harness.controller.registry().is_empty().await);
    assert_eq!(harness.marketplace.reads.load(Ordering::SeqCst), 2);
    let heartbeats = harness.sink.heartbeats_for("job-t");
    assert_eq!(heartbeats.len(), 1, "heartbeats: {heartbeats:?}");
    assert_eq!(heartbeats[0].state, InstanceState::Failed);
}

#[tokio::test(start_paused = true)]
async fn user_stop_is_never_redeployed() {
    let harness = start(MockMarketplace::default());
    harness
        .marketplace
        .set_job(snapshot("job-c", JobState::Running));
    harness
        .controller
        .adopt(watched("job-c", 120, ResourceProfile::default()))
        .await;
    settle(Duration::from_secs(5)).await;

    let receipt = harness.controller.stop("job-c").await.expect("stop");
    assert_eq!(receipt.tx.as_deref(), Some("stop-tx"));
    settle(Duration::from_secs(120)).await;

    assert!(harness.controller.registry().is_empty().await);
    assert!(harness.marketplace.posted().is_empty());
    let states: Vec<_> = harness
        .sink
        .heartbeats_for("job-c")
        .into_iter()
        .map(|heartbeat| heartbeat.state)
        .collect();
    assert_eq!(states.first(), Some(&InstanceState::Ready));
    assert_eq!(states.last(), Some(&InstanceState::Terminated));
    assert!(!states.contains(&InstanceState::Failed));
}

#[tokio::test(start_paused = true)]
async fn running_job_near_lease_end_is_extended_once() {
    let harness = start(MockMarketplace::default());
    let mut running = snapshot("job-d", JobState::Running);
    running.time_start = Some(Utc::now().timestamp() - 100);
    running.timeout_secs = Some(200);
    harness.marketplace.set_job(running);
    let job = watched("job-d", 2, ResourceProfile::default());
    let original_extend_time = job.last_extend_time;
    harness.controller.adopt(job).await;

    settle(Duration::from_secs(200)).await;

    assert_eq!(
        harness.marketplace.extends(),
        vec![("job-d".to_string(), 1800)]
    );
    let stored = harness
        .controller
        .watched_job("job-d")
        .await
        .expect("still watched");
    assert!(stored.last_extend_time > original_extend_time);

    let ready: Vec<_> = harness
        .sink
        .heartbeats_for("job-d")
        .into_iter()
        .filter(|heartbeat| heartbeat.state == InstanceState::Ready)
        .collect();
    assert!(!ready.is_empty());
    assert!(ready.iter().all(|heartbeat| heartbeat.health_score == 100));
}

#[tokio::test(start_paused = true)]
async fn adopting_the_same_address_twice_keeps_one_entry() {
    let harness = start(MockMarketplace::default());
    harness
        .marketplace
        .set_job(snapshot("job-e", JobState::Queued));
    assert!(
        harness
            .controller
            .adopt(watched("job-e", 1, ResourceProfile::default()))
            .await
    );
    assert!(
        !harness
            .controller
            .adopt(watched("job-e", 1, ResourceProfile::default()))
            .await
    );
    settle(Duration::from_secs(130)).await;

    assert_eq!(harness.controller.registry().len().await, 1);
    let state_changes = harness
        .sink
        .audit_actions()
        .into_iter()
        .filter(|action| action == "job.state_change")
        .count();
    assert_eq!(state_changes, 1);
}

#[tokio::test(start_paused = true)]
async fn launch_pins_definition_and_records_service_url() {
    let harness = start(MockMarketplace::default());
    let definition = json!({
        "version": "0.1",
        "type": "container",
        "ops": [{ "id": "web", "args": { "image": "nginx", "expose": 8080 } }],
    });
    let outcome = harness
        .controller
        .launch(LaunchRequest {
            definition: definition.clone(),
            market: "market-1".to_string(),
            confidential: false,
            resources: ResourceProfile::default(),
        })
        .await
        .expect("launch");

    assert_eq!(outcome.job_address, "new-job-1");
    assert_eq!(outcome.tx.as_deref(), Some("tx-1"));
    assert_eq!(
        harness.marketplace.pinned(&outcome.content_ref),
        Some(definition)
    );
    let stored = harness
        .controller
        .watched_job("new-job-1")
        .await
        .expect("watched");
    let url = stored.service_url.expect("service url");
    assert!(url.starts_with("https://"));
    assert!(url.ends_with(".node.k8s.prd.nos.ci"));

    settle(Duration::from_secs(1)).await;
    assert!(
        harness
            .sink
            .audit_actions()
            .contains(&"job.launch".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn confidential_launch_pins_only_the_placeholder() {
    let harness = start(MockMarketplace::default());
    let definition = json!({
        "version": "0.1",
        "type": "container",
        "meta": { "trigger": "api" },
        "ops": [{
            "id": "secret",
            "args": { "image": "private/model", "cmd": ["serve"], "env": { "TOKEN": "s3cr3t" } }
        }],
    });
    let outcome = harness
        .controller
        .launch(LaunchRequest {
            definition: definition.clone(),
            market: "market-1".to_string(),
            confidential: true,
            resources: ResourceProfile::default(),
        })
        .await
        .expect("launch");

    let pinned = harness
        .marketplace
        .pinned(&outcome.content_ref)
        .expect("pinned placeholder");
    let pinned_text = pinned.to_string();
    assert!(!pinned_text.contains("private/model"));
    assert!(!pinned_text.contains("s3cr3t"));
    assert_eq!(pinned["ops"], json!([]));

    let stored = harness
        .controller
        .watched_job(&outcome.job_address)
        .await
        .expect("watched");
    assert_eq!(stored.definition, definition);
    assert!(stored.confidential);
}

#[tokio::test(start_paused = true)]
async fn launch_resolves_deployment_handle_by_polling() {
    let harness = start(MockMarketplace {
        deployment_only: true,
        deployment_resolves_after: Some(3),
        ..MockMarketplace::default()
    });
    let outcome = harness
        .controller
        .launch(LaunchRequest {
            definition: json!({ "ops": [] }),
            market: "market-1".to_string(),
            confidential: false,
            resources: ResourceProfile::default(),
        })
        .await
        .expect("launch");
    assert_eq!(outcome.job_address, "new-job-1");
    assert_eq!(outcome.deployment_handle.as_deref(), Some("deployment-1"));
    assert_eq!(harness.marketplace.deployment_polls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn unresolved_deployment_times_out() {
    let harness = start(MockMarketplace {
        deployment_only: true,
        ..MockMarketplace::default()
    });
    let error = harness
        .controller
        .launch(LaunchRequest {
            definition: json!({ "ops": [] }),
            market: "market-1".to_string(),
            confidential: false,
            resources: ResourceProfile::default(),
        })
        .await
        .expect_err("launch should time out");
    assert!(matches!(error, ComputeError::LaunchTimeout(_)));
    assert_eq!(harness.marketplace.deployment_polls.load(Ordering::SeqCst), 30);
    assert!(harness.controller.registry().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn recovery_adopts_live_jobs_owned_by_local_identity() {
    let key = SigningKey::from_bytes(&[9_u8; 32]);
    let identity = hex::encode(key.verifying_key().as_bytes());

    let marketplace = MockMarketplace::default();
    marketplace
        .blobs
        .lock()
        .expect("blobs lock")
        .insert("def-1".to_string(), json!({ "ops": [{ "id": "a" }] }));
    let mut mine = snapshot("job-mine", JobState::Running);
    mine.owner = Some(identity.clone());
    mine.definition_ref = Some("def-1".to_string());
    let mut finished = snapshot("job-done", JobState::Completed);
    finished.owner = Some(identity);
    let mut foreign = snapshot("job-foreign", JobState::Running);
    foreign.owner = Some("someone-else".to_string());
    *marketplace.listing.lock().expect("listing lock") =
        Some(vec![mine.clone(), finished, foreign]);
    marketplace.set_job(mine);

    let harness = start_with(marketplace, AuthProvider::offline(Some(key), "challenge"));
    let report = harness.controller.recover().await.expect("recover");

    assert!(report.listing_supported);
    assert_eq!(report.recovered, 1);
    let watched_jobs = harness.controller.watched_jobs().await;
    assert_eq!(watched_jobs.len(), 1);
    assert_eq!(watched_jobs[0].job_address, "job-mine");
    assert!(watched_jobs[0].is_redeployable());
}

#[tokio::test(start_paused = true)]
async fn recovery_without_listing_rearms_registry_only() {
    let harness = start(MockMarketplace::default());
    harness
        .marketplace
        .set_job(snapshot("job-f", JobState::Queued));
    harness
        .controller
        .adopt(watched("job-f", 1, ResourceProfile::default()))
        .await;

    let report = harness.controller.recover().await.expect("recover");
    assert!(!report.listing_supported);
    assert_eq!(report.recovered, 0);
    assert_eq!(report.rearmed, 1);
    settle(Duration::from_secs(5)).await;
    assert_eq!(harness.controller.registry().len().await, 1);
}
