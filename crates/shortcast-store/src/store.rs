//! File-backed job store with atomic snapshot persistence.
//!
//! Every create/update serializes the full job table to a temp file and
//! renames it over the live snapshot before the call returns, so a
//! committed write is never lost to a crash. The `source_id -> job_id`
//! index is derived from the jobs themselves on load and kept in memory.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shortcast_models::{JobId, JobState, SourceId, VideoJob};

use crate::error::{StoreError, StoreResult};

const SNAPSHOT_FILE: &str = "jobs.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    jobs: Vec<VideoJob>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, VideoJob>,
    by_source: HashMap<SourceId, JobId>,
}

impl Inner {
    fn index_job(&mut self, job: &VideoJob) {
        for image in &job.images {
            self.by_source.insert(image.source_id.clone(), job.id.clone());
        }
    }

    fn snapshot(&self) -> Snapshot {
        let mut jobs: Vec<VideoJob> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Snapshot { jobs }
    }
}

/// Durable mapping from `JobId` to `VideoJob`.
pub struct JobStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl JobStore {
    /// Open (or create) a store under `data_dir`.
    ///
    /// Jobs left mid-stage by a crash are normalized back to the last
    /// durably committed retry point: `Composing -> Pending`,
    /// `Publishing -> Composed`, attempt counters preserved.
    pub async fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        let path = data_dir.join(SNAPSHOT_FILE);

        let mut inner = Inner::default();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                let mut recovered = 0usize;
                for mut job in snapshot.jobs {
                    match job.state {
                        JobState::Composing => {
                            job.state = JobState::Pending;
                            recovered += 1;
                        }
                        JobState::Publishing => {
                            job.state = JobState::Composed;
                            recovered += 1;
                        }
                        _ => {}
                    }
                    inner.index_job(&job);
                    inner.jobs.insert(job.id.clone(), job);
                }
                info!(
                    jobs = inner.jobs.len(),
                    recovered, "Loaded job store from {}", path.display()
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Starting empty job store at {}", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        let store = Self {
            path,
            inner: Mutex::new(inner),
        };

        // Re-persist so the normalized states are the committed truth.
        {
            let inner = store.inner.lock().await;
            if !inner.jobs.is_empty() {
                store.persist(&inner).await?;
            }
        }

        Ok(store)
    }

    async fn persist(&self, inner: &Inner) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(&inner.snapshot())?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Insert a new job. Durable before returning.
    pub async fn create(&self, job: VideoJob) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }

        inner.index_job(&job);
        let id = job.id.clone();
        inner.jobs.insert(id.clone(), job);

        if let Err(e) = self.persist(&inner).await {
            // Roll back so memory matches the snapshot on disk.
            if let Some(job) = inner.jobs.remove(&id) {
                for image in &job.images {
                    inner.by_source.remove(&image.source_id);
                }
            }
            return Err(e);
        }

        debug!(job_id = %id, "Created job");
        Ok(())
    }

    /// Fetch a job by ID.
    pub async fn get(&self, id: &JobId) -> Option<VideoJob> {
        self.inner.lock().await.jobs.get(id).cloned()
    }

    /// Read-modify-write with optimistic concurrency.
    ///
    /// Fails with `Conflict` when the job's version no longer matches
    /// `expected_version`; callers re-read and retry. Durable before
    /// returning the updated job.
    pub async fn update<F>(
        &self,
        id: &JobId,
        expected_version: u64,
        mutator: F,
    ) -> StoreResult<VideoJob>
    where
        F: FnOnce(&mut VideoJob),
    {
        let mut inner = self.inner.lock().await;

        let current = inner
            .jobs
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if current.version != expected_version {
            return Err(StoreError::Conflict {
                id: id.clone(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let previous = current.clone();
        let mut updated = previous.clone();
        mutator(&mut updated);
        updated.version = expected_version + 1;
        updated.updated_at = Utc::now();

        inner.jobs.insert(id.clone(), updated.clone());

        if let Err(e) = self.persist(&inner).await {
            inner.jobs.insert(id.clone(), previous);
            return Err(e);
        }

        debug!(job_id = %id, state = %updated.state, version = updated.version, "Updated job");
        Ok(updated)
    }

    /// All jobs not in a terminal state, oldest first.
    pub async fn list_active(&self) -> Vec<VideoJob> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<VideoJob> = inner
            .jobs
            .values()
            .filter(|j| !j.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// All jobs, oldest first.
    pub async fn list_all(&self) -> Vec<VideoJob> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<VideoJob> = inner.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Look up the job that consumed a source image, if any.
    pub async fn find_by_source(&self, source_id: &SourceId) -> Option<JobId> {
        self.inner.lock().await.by_source.get(source_id).cloned()
    }

    /// True when the source image is already assigned to a job.
    pub async fn contains_source(&self, source_id: &SourceId) -> bool {
        self.inner.lock().await.by_source.contains_key(source_id)
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.jobs.is_empty()
    }

    /// Drop terminal jobs older than the retention window.
    ///
    /// Removing a job also forgets its dedup entries, so the window
    /// must exceed any realistic source replay horizon. Not scheduled
    /// by default; exposed for an operator-driven retention policy.
    pub async fn sweep_terminal(&self, older_than: chrono::Duration) -> StoreResult<usize> {
        let cutoff: DateTime<Utc> = Utc::now() - older_than;
        let mut inner = self.inner.lock().await;

        let expired: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|j| j.is_terminal() && j.updated_at < cutoff)
            .map(|j| j.id.clone())
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        for id in &expired {
            if let Some(job) = inner.jobs.remove(id) {
                for image in &job.images {
                    inner.by_source.remove(&image.source_id);
                }
            }
        }

        self.persist(&inner).await?;
        warn!(swept = expired.len(), "Swept terminal jobs past retention");
        Ok(expired.len())
    }
}
