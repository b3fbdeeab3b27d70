//! Video job definitions and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ArtifactHandle, ImageRef, JobId, RemoteVideoId};

/// Job lifecycle state.
///
/// Transitions are monotonic except `Failed -> Pending` under an
/// explicit retry reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for the compose stage
    #[default]
    Pending,
    /// Compose stage is in flight
    Composing,
    /// Rendered, waiting for the publish stage
    Composed,
    /// Publish stage is in flight
    Publishing,
    /// Published successfully
    Done,
    /// Gave up (attempts exhausted, terminal error, or cancelled)
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Composing => "composing",
            JobState::Composed => "composed",
            JobState::Publishing => "publishing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One phase of the pipeline, with its own attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Compose,
    Publish,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Compose => "compose",
            StageKind::Publish => "publish",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of scheduled work: a batch of images driven through
/// composition and publication.
///
/// The image set is frozen at creation and kept in arrival order;
/// that order is the video frame order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    /// Unique, time-ordered job ID
    pub id: JobId,

    /// Ordered image batch (at least one, never mutated after creation)
    pub images: Vec<ImageRef>,

    /// Lifecycle state
    #[serde(default)]
    pub state: JobState,

    /// Compose stage attempts so far
    #[serde(default)]
    pub compose_attempts: u32,

    /// Publish stage attempts so far
    #[serde(default)]
    pub publish_attempts: u32,

    /// Last failure reason, cleared on stage success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Rendered artifact, set on compose success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactHandle>,

    /// Remote identifier, set only when Done
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_video_id: Option<RemoteVideoId>,

    /// Earliest instant the job may be dispatched again (backoff gate)
    pub next_eligible_at: DateTime<Utc>,

    /// Operator requested cancellation; honored between stages
    #[serde(default)]
    pub cancel_requested: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency token, bumped by the store on update
    #[serde(default)]
    pub version: u64,
}

impl VideoJob {
    /// Create a new pending job.
    ///
    /// Callers must pass at least one image; the batch assembler
    /// guarantees this.
    pub fn new(images: Vec<ImageRef>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            images,
            state: JobState::Pending,
            compose_attempts: 0,
            publish_attempts: 0,
            last_error: None,
            artifact: None,
            remote_video_id: None,
            next_eligible_at: now,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Attempt counter for a stage.
    pub fn attempts(&self, stage: StageKind) -> u32 {
        match stage {
            StageKind::Compose => self.compose_attempts,
            StageKind::Publish => self.publish_attempts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// True when the job is active and past its backoff gate.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && self.next_eligible_at <= now
    }

    /// Mark a stage as in flight.
    pub fn begin(&mut self, stage: StageKind) {
        self.state = match stage {
            StageKind::Compose => JobState::Composing,
            StageKind::Publish => JobState::Publishing,
        };
        self.updated_at = Utc::now();
    }

    /// Record compose success.
    pub fn complete_compose(&mut self, artifact: ArtifactHandle) {
        self.state = JobState::Composed;
        self.artifact = Some(artifact);
        self.last_error = None;
        self.next_eligible_at = Utc::now();
        self.updated_at = Utc::now();
    }

    /// Record publish success.
    pub fn complete_publish(&mut self, remote: RemoteVideoId) {
        self.state = JobState::Done;
        self.remote_video_id = Some(remote);
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// Record a retryable stage failure and schedule the next attempt.
    pub fn record_stage_failure(
        &mut self,
        stage: StageKind,
        reason: impl Into<String>,
        next_eligible_at: DateTime<Utc>,
    ) {
        match stage {
            StageKind::Compose => {
                self.compose_attempts += 1;
                self.state = JobState::Pending;
            }
            StageKind::Publish => {
                self.publish_attempts += 1;
                self.state = JobState::Composed;
            }
        }
        self.last_error = Some(reason.into());
        self.next_eligible_at = next_eligible_at;
        self.updated_at = Utc::now();
    }

    /// Move the job to its terminal failure state.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = JobState::Failed;
        self.last_error = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Reset a failed job back to pending (operator or policy action).
    ///
    /// Attempt counters and the last error are cleared; a recorded
    /// artifact is kept so the compose stage can be skipped.
    pub fn reset_for_retry(&mut self) {
        self.state = if self.artifact.is_some() {
            JobState::Composed
        } else {
            JobState::Pending
        };
        self.compose_attempts = 0;
        self.publish_attempts = 0;
        self.last_error = None;
        self.cancel_requested = false;
        self.next_eligible_at = Utc::now();
        self.updated_at = Utc::now();
    }

    /// Request cancellation; the runner honors it between stages.
    pub fn request_cancel(&mut self) {
        self.cancel_requested = true;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceId;

    fn image(n: u32) -> ImageRef {
        ImageRef::new(SourceId::new(format!("src-{n}")), format!("/tmp/{n}.jpg"), Utc::now())
    }

    #[test]
    fn test_new_job_is_pending_and_eligible() {
        let job = VideoJob::new(vec![image(1), image(2)]);
        assert_eq!(job.state, JobState::Pending);
        assert!(job.is_eligible(Utc::now()));
        assert_eq!(job.images.len(), 2);
    }

    #[test]
    fn test_stage_success_transitions() {
        let mut job = VideoJob::new(vec![image(1)]);

        job.begin(StageKind::Compose);
        assert_eq!(job.state, JobState::Composing);

        job.complete_compose(ArtifactHandle::new("/tmp/out.mp4"));
        assert_eq!(job.state, JobState::Composed);
        assert!(job.artifact.is_some());
        assert!(job.last_error.is_none());

        job.begin(StageKind::Publish);
        job.complete_publish(RemoteVideoId::new("yt-123"));
        assert_eq!(job.state, JobState::Done);
        assert!(job.is_terminal());
    }

    #[test]
    fn test_stage_failure_returns_to_retry_state() {
        let mut job = VideoJob::new(vec![image(1)]);
        let later = Utc::now() + chrono::Duration::seconds(30);

        job.begin(StageKind::Compose);
        job.record_stage_failure(StageKind::Compose, "boom", later);

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.compose_attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
        assert!(!job.is_eligible(Utc::now()));
    }

    #[test]
    fn test_reset_for_retry_keeps_artifact() {
        let mut job = VideoJob::new(vec![image(1)]);
        job.complete_compose(ArtifactHandle::new("/tmp/out.mp4"));
        job.fail("publish rejected");
        assert!(job.is_terminal());

        job.reset_for_retry();
        assert_eq!(job.state, JobState::Composed);
        assert_eq!(job.publish_attempts, 0);
        assert!(job.last_error.is_none());
    }
}
