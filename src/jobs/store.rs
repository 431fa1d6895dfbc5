//! In-memory job registry.
//!
//! The only shared mutable state in the service. Every operation takes the
//! lock just long enough to copy or replace a record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{Job, JobSnapshot, JobStatus, JobUpdate, short_id};
use crate::error::JobError;

/// Concurrency-safe map of job id → [`Job`].
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl JobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
        })
    }

    /// Register a new job at PENDING/0%.
    pub async fn create(&self, id: Uuid) -> JobSnapshot {
        let job = Job::new(id);
        let snapshot = job.snapshot();
        self.jobs.write().await.insert(id, job);
        info!(job_id = %short_id(&id), "Job created");
        snapshot
    }

    /// Atomically replace a job's mutable fields.
    ///
    /// Rejects updates that would move status backwards, leave a terminal
    /// status, decrease progress, or pair result/error with the wrong status.
    pub async fn update(&self, id: Uuid, update: JobUpdate) -> Result<JobSnapshot, JobError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound { id })?;

        let invalid = || JobError::InvalidTransition {
            id,
            state: job.status.to_string(),
            target: update.status.to_string(),
        };

        if !job.status.can_transition_to(update.status) {
            return Err(invalid());
        }
        let progress = update.progress.min(100);
        if !update.status.is_terminal() && progress < job.progress {
            return Err(invalid());
        }
        let completed = update.status == JobStatus::Completed;
        let failed = update.status == JobStatus::Failed;
        if update.result.is_some() != completed || update.error.is_some() != failed {
            return Err(invalid());
        }

        job.status = update.status;
        job.progress = progress;
        job.current_step = update.message.clone();
        job.message = update.message;
        job.result = update.result;
        job.error = update.error;
        job.updated_at = Utc::now();

        info!(
            job_id = %job.short_id(),
            status = %job.status,
            progress = job.progress,
            message = %job.message,
            "Job updated"
        );
        Ok(job.snapshot())
    }

    pub async fn get(&self, id: Uuid) -> Result<JobSnapshot, JobError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(Job::snapshot)
            .ok_or(JobError::NotFound { id })
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), JobError> {
        match self.jobs.write().await.remove(&id) {
            Some(job) => {
                info!(job_id = %job.short_id(), status = %job.status, "Job deleted");
                Ok(())
            }
            None => Err(JobError::NotFound { id }),
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Ids of jobs that have not reached a terminal status.
    pub async fn in_flight(&self) -> Vec<Uuid> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.status.is_active())
            .map(|job| job.id)
            .collect()
    }

    /// Remove terminal jobs whose last update is at least `ttl` old.
    /// Returns the number evicted.
    pub async fn evict_expired(&self, ttl: Duration) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let now = Utc::now();

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.status.is_active() || now - job.updated_at < ttl);
        let evicted = before - jobs.len();

        if evicted > 0 {
            info!(evicted, remaining = jobs.len(), "Evicted expired jobs");
        } else {
            debug!(remaining = jobs.len(), "No expired jobs to evict");
        }
        evicted
    }
}

/// Spawn a background task that periodically evicts expired jobs.
///
/// A zero `every` is raised to one millisecond.
pub fn spawn_eviction_task(
    store: Arc<JobStore>,
    ttl: Duration,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
        loop {
            interval.tick().await;
            store.evict_expired(ttl).await;
        }
    })
}
