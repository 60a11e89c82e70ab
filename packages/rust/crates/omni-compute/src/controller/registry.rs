//! Watch registry: the only state shared across watch tasks.
//!
//! Each watch task writes only its own key. No lock is held across an await
//! on anything but the map itself.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::WatchedJob;

/// Concurrent map of watched jobs keyed by job address.
#[derive(Clone, Default)]
pub struct WatchRegistry {
    jobs: Arc<RwLock<HashMap<String, WatchedJob>>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `job` unless its address is already watched. Returns whether it was inserted.
    pub(crate) async fn insert_new(&self, job: WatchedJob) -> bool {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_address) {
            return false;
        }
        jobs.insert(job.job_address.clone(), job);
        true
    }

    pub async fn get(&self, job_address: &str) -> Option<WatchedJob> {
        self.jobs.read().await.get(job_address).cloned()
    }

    pub async fn contains(&self, job_address: &str) -> bool {
        self.jobs.read().await.contains_key(job_address)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// All watched jobs, sorted by address.
    pub async fn snapshot(&self) -> Vec<WatchedJob> {
        let mut jobs: Vec<WatchedJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|left, right| left.job_address.cmp(&right.job_address));
        jobs
    }

    pub(crate) async fn remove(&self, job_address: &str) -> Option<WatchedJob> {
        self.jobs.write().await.remove(job_address)
    }

    /// Flag a user stop. Write-once: the flag is never cleared.
    pub(crate) async fn mark_user_stopped(&self, job_address: &str) -> bool {
        match self.jobs.write().await.get_mut(job_address) {
            Some(job) => {
                job.user_stopped = true;
                true
            }
            None => false,
        }
    }

    /// Record the service URL unless one is already set. First resolution wins.
    pub(crate) async fn set_service_url_once(&self, job_address: &str, url: String) -> bool {
        match self.jobs.write().await.get_mut(job_address) {
            Some(job) if job.service_url.is_none() => {
                job.service_url = Some(url);
                true
            }
            _ => false,
        }
    }

    /// Move `last_extend_time` forward; never backwards.
    pub(crate) async fn record_extension(&self, job_address: &str, at: DateTime<Utc>) {
        if let Some(job) = self.jobs.write().await.get_mut(job_address)
            && at > job.last_extend_time
        {
            job.last_extend_time = at;
        }
    }
}
