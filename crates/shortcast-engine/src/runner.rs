//! Pipeline runner: drives one job through compose and publish.
//!
//! Stage failures stay local to the owning job. A retryable failure
//! bumps the stage's attempt counter and pushes the job behind an
//! exponential backoff gate; a terminal failure or attempt exhaustion
//! fails the job. The scheduler guarantees a single executor per job,
//! and store updates are version-checked on top of that.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use shortcast_models::{JobId, JobState, StageKind, StyleConfig, VideoJob, VideoMetadata};
use shortcast_store::{JobStore, StoreError};

use crate::backoff;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::pipeline::{Compositor, Notifier, Publisher};
use crate::titles::TitlePicker;

/// Static parts of the metadata attached to every published video.
#[derive(Debug, Clone, Default)]
pub struct PublishDefaults {
    pub description: String,
    pub tags: Vec<String>,
}

/// Drives jobs through the Compose -> Publish state machine.
pub struct PipelineRunner {
    store: Arc<JobStore>,
    compositor: Arc<dyn Compositor>,
    publisher: Arc<dyn Publisher>,
    notifier: Option<Arc<dyn Notifier>>,
    titles: TitlePicker,
    style: StyleConfig,
    publish_defaults: PublishDefaults,
    config: EngineConfig,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<JobStore>,
        compositor: Arc<dyn Compositor>,
        publisher: Arc<dyn Publisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            compositor,
            publisher,
            notifier: None,
            titles: TitlePicker::default(),
            style: StyleConfig::default(),
            publish_defaults: PublishDefaults::default(),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_titles(mut self, titles: TitlePicker) -> Self {
        self.titles = titles;
        self
    }

    pub fn with_style(mut self, style: StyleConfig) -> Self {
        self.style = style;
        self
    }

    pub fn with_publish_defaults(mut self, defaults: PublishDefaults) -> Self {
        self.publish_defaults = defaults;
        self
    }

    /// Advance a job by one stage.
    ///
    /// Terminal jobs are a no-op: in particular a `Done` job never
    /// reaches the publishing sink again.
    pub async fn advance(&self, id: &JobId) -> EngineResult<JobState> {
        let job = self.get(id).await?;

        if job.is_terminal() {
            return Ok(job.state);
        }

        if job.cancel_requested {
            return self.fail_cancelled(id).await;
        }

        match job.state {
            JobState::Pending => {
                if let Some(artifact) = job.artifact.clone() {
                    // Artifact already recorded (crash after a render
                    // commit): skip straight to publish eligibility.
                    let updated = self
                        .apply(id, move |j| j.complete_compose(artifact.clone()))
                        .await?;
                    info!(job_id = %id, "Compose skipped, artifact already recorded");
                    Ok(updated.state)
                } else {
                    self.run_compose(job).await
                }
            }
            JobState::Composed => self.run_publish(job).await,
            // Claimed by another executor; nothing to do here.
            JobState::Composing | JobState::Publishing => Ok(job.state),
            JobState::Done | JobState::Failed => Ok(job.state),
        }
    }

    /// Reset a failed job back into the pipeline (operator action).
    pub async fn retry_failed(&self, id: &JobId) -> EngineResult<VideoJob> {
        let job = self.get(id).await?;
        if job.state != JobState::Failed {
            warn!(job_id = %id, state = %job.state, "Retry requested for a job that is not failed");
            return Ok(job);
        }

        let updated = self.apply(id, |j| j.reset_for_retry()).await?;
        info!(job_id = %id, state = %updated.state, "Failed job reset for retry");
        Ok(updated)
    }

    /// Mark a job for cancellation; honored between stages.
    pub async fn request_cancel(&self, id: &JobId) -> EngineResult<VideoJob> {
        let updated = self.apply(id, |j| j.request_cancel()).await?;
        info!(job_id = %id, "Cancellation requested");
        Ok(updated)
    }

    async fn run_compose(&self, job: VideoJob) -> EngineResult<JobState> {
        let id = job.id.clone();
        let claimed = self
            .store
            .update(&id, job.version, |j| j.begin(StageKind::Compose))
            .await?;
        info!(
            job_id = %id,
            images = claimed.images.len(),
            attempt = claimed.compose_attempts + 1,
            "Composing video"
        );

        let result = match tokio::time::timeout(
            self.config.stage_timeout,
            self.compositor.compose(&claimed.images, &self.style),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(EngineError::timeout("compose")),
        };

        if self.get(&id).await?.cancel_requested {
            // Result discarded by design of between-stage cancellation.
            return self.fail_cancelled(&id).await;
        }

        match result {
            Ok(artifact) => {
                info!(job_id = %id, artifact = %artifact.path, "Composed video");
                let updated = self
                    .apply(&id, move |j| j.complete_compose(artifact.clone()))
                    .await?;
                Ok(updated.state)
            }
            Err(e) => self.handle_stage_failure(&id, StageKind::Compose, e).await,
        }
    }

    async fn run_publish(&self, job: VideoJob) -> EngineResult<JobState> {
        let id = job.id.clone();
        let claimed = self
            .store
            .update(&id, job.version, |j| j.begin(StageKind::Publish))
            .await?;

        let Some(artifact) = claimed.artifact.clone() else {
            // Composed without an artifact is a consistency bug, not
            // something retries can heal.
            error!(job_id = %id, "Composed job has no artifact");
            let updated = self
                .apply(&id, |j| j.fail("composed job missing artifact"))
                .await?;
            return Ok(updated.state);
        };

        let metadata = VideoMetadata::new(self.titles.pick().await)
            .with_description(self.publish_defaults.description.clone())
            .with_tags(self.publish_defaults.tags.clone());

        info!(
            job_id = %id,
            title = %metadata.title,
            attempt = claimed.publish_attempts + 1,
            "Publishing video"
        );

        let result = match tokio::time::timeout(
            self.config.stage_timeout,
            self.publisher.publish(&artifact, &metadata),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(EngineError::timeout("publish")),
        };

        if self.get(&id).await?.cancel_requested {
            return self.fail_cancelled(&id).await;
        }

        match result {
            Ok(remote) => {
                info!(job_id = %id, remote_video_id = %remote, "Published video");
                self.notify(&format!("Published video {remote} (job {id})")).await;
                let updated = self
                    .apply(&id, move |j| j.complete_publish(remote.clone()))
                    .await?;
                Ok(updated.state)
            }
            Err(e) => self.handle_stage_failure(&id, StageKind::Publish, e).await,
        }
    }

    async fn handle_stage_failure(
        &self,
        id: &JobId,
        stage: StageKind,
        err: EngineError,
    ) -> EngineResult<JobState> {
        let job = self.get(id).await?;
        let attempts = job.attempts(stage) + 1;
        let exhausted = attempts >= self.config.max_stage_attempts;

        if !err.is_retryable() || exhausted {
            let reason = if err.is_retryable() {
                format!("{stage} failed after {attempts} attempts: {err}")
            } else {
                format!("{stage} rejected permanently: {err}")
            };
            error!(job_id = %id, stage = %stage, attempts, "{}", reason);

            let fail_reason = reason.clone();
            let updated = self
                .apply(id, move |j| {
                    // Keep the attempt in the counters for diagnosis.
                    j.record_stage_failure(stage, fail_reason.clone(), Utc::now());
                    j.fail(fail_reason.clone());
                })
                .await?;
            self.notify(&format!("Job {id} failed: {reason}")).await;
            return Ok(updated.state);
        }

        let next = backoff::next_eligible_at(
            Utc::now(),
            self.config.backoff_base,
            self.config.backoff_max,
            attempts,
        );
        warn!(
            job_id = %id,
            stage = %stage,
            attempt = attempts,
            next_eligible_at = %next,
            "Stage failed, backing off: {}", err
        );

        let reason = err.to_string();
        let updated = self
            .apply(id, move |j| {
                j.record_stage_failure(stage, reason.clone(), next)
            })
            .await?;
        Ok(updated.state)
    }

    async fn fail_cancelled(&self, id: &JobId) -> EngineResult<JobState> {
        let updated = self.apply(id, |j| j.fail("cancelled")).await?;
        warn!(job_id = %id, "Job cancelled");
        Ok(updated.state)
    }

    async fn get(&self, id: &JobId) -> EngineResult<VideoJob> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| StoreError::NotFound(id.clone()).into())
    }

    /// Read-modify-write with transparent retry on version conflicts.
    async fn apply<F>(&self, id: &JobId, mutator: F) -> EngineResult<VideoJob>
    where
        F: Fn(&mut VideoJob),
    {
        const MAX_CONFLICT_RETRIES: u32 = 5;
        let mut conflicts = 0;
        loop {
            let job = self.get(id).await?;
            match self.store.update(id, job.version, &mutator).await {
                Ok(updated) => return Ok(updated),
                Err(StoreError::Conflict { .. }) if conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn notify(&self, message: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(message).await;
        }
    }
}
