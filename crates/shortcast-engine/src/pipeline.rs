//! Collaborator seams: compositor, publishing sink, notifier.

use async_trait::async_trait;

use shortcast_models::{ArtifactHandle, ImageRef, RemoteVideoId, StyleConfig, VideoMetadata};

use crate::error::EngineResult;

/// Renders an ordered image batch into a video artifact.
///
/// The engine treats this as a black box with a duration and a
/// success/failure outcome; failures are retryable up to the
/// configured bound.
#[async_trait]
pub trait Compositor: Send + Sync {
    async fn compose(
        &self,
        images: &[ImageRef],
        style: &StyleConfig,
    ) -> EngineResult<ArtifactHandle>;
}

/// Uploads a rendered artifact and returns its remote identifier.
///
/// Implementations must classify failures via
/// `EngineError::publish_retryable` / `publish_terminal` so the runner
/// can distinguish rate limits from credential or content rejections.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        artifact: &ArtifactHandle,
        metadata: &VideoMetadata,
    ) -> EngineResult<RemoteVideoId>;
}

/// Best-effort operator notifications (publish results, dead jobs).
/// Failures are logged by implementations and never affect a job.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}
