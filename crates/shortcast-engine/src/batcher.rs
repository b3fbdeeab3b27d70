//! Batch assembler: cuts pending images into video jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use shortcast_models::VideoJob;
use shortcast_store::{JobStore, StoreResult};

use crate::buffer::SharedBuffer;

/// Hybrid batching policy: a count threshold with a time-window
/// fallback so small batches never starve.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    /// Buffered images needed to fire on count
    pub min_images: usize,
    /// Oldest-image age that fires regardless of count
    pub max_wait: Duration,
}

/// Groups accumulated images into jobs once the policy is satisfied.
pub struct BatchAssembler {
    buffer: SharedBuffer,
    store: Arc<JobStore>,
    policy: BatchPolicy,
}

impl BatchAssembler {
    pub fn new(buffer: SharedBuffer, store: Arc<JobStore>, policy: BatchPolicy) -> Self {
        Self {
            buffer,
            store,
            policy,
        }
    }

    /// Cut one batch if the policy fires, creating the job durably.
    ///
    /// Count fire takes the oldest `min_images`; time fire takes the
    /// whole buffer. The drain and the store create happen under the
    /// buffer lock, so an image lands in at most one job.
    pub async fn try_assemble(&self) -> StoreResult<Option<VideoJob>> {
        let mut buffer = self.buffer.lock().await;

        let fire_on_count = buffer.len() >= self.policy.min_images;
        let fire_on_time = !fire_on_count
            && buffer
                .oldest_received_at()
                .map(|oldest| {
                    Utc::now().signed_duration_since(oldest).to_std().unwrap_or_default()
                        >= self.policy.max_wait
                })
                .unwrap_or(false);

        let images = if fire_on_count {
            buffer.take_oldest(self.policy.min_images)
        } else if fire_on_time {
            buffer.take_all()
        } else {
            return Ok(None);
        };

        let job = VideoJob::new(images);
        if let Err(e) = self.store.create(job.clone()).await {
            // Undo the drain; the images were never committed anywhere.
            buffer.restore_front(job.images);
            return Err(e);
        }

        info!(
            job_id = %job.id,
            images = job.images.len(),
            trigger = if fire_on_count { "count" } else { "time" },
            "Assembled video job"
        );
        Ok(Some(job))
    }

    /// Cut batches until the policy no longer fires.
    pub async fn drain(&self) -> StoreResult<Vec<VideoJob>> {
        let mut jobs = Vec::new();
        while let Some(job) = self.try_assemble().await? {
            jobs.push(job);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::shared_buffer;
    use shortcast_models::{ImageRef, SourceId};

    fn policy(min_images: usize, max_wait_secs: u64) -> BatchPolicy {
        BatchPolicy {
            min_images,
            max_wait: Duration::from_secs(max_wait_secs),
        }
    }

    fn image_at(n: u32, received_at: chrono::DateTime<Utc>) -> ImageRef {
        ImageRef::new(SourceId::new(format!("src-{n}")), format!("/tmp/{n}.jpg"), received_at)
    }

    async fn setup(p: BatchPolicy) -> (SharedBuffer, Arc<JobStore>, BatchAssembler) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::open(dir.path()).await.unwrap());
        std::mem::forget(dir);
        let buffer = shared_buffer();
        let assembler = BatchAssembler::new(Arc::clone(&buffer), Arc::clone(&store), p);
        (buffer, store, assembler)
    }

    #[tokio::test]
    async fn test_does_not_fire_below_threshold() {
        let (buffer, _store, assembler) = setup(policy(3, 600)).await;
        buffer.lock().await.push(image_at(1, Utc::now()));
        buffer.lock().await.push(image_at(2, Utc::now()));

        assert!(assembler.try_assemble().await.unwrap().is_none());
        assert_eq!(buffer.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_count_fire_takes_exactly_min_images_in_order() {
        let (buffer, store, assembler) = setup(policy(3, 600)).await;
        for n in 1..=3 {
            buffer.lock().await.push(image_at(n, Utc::now()));
        }

        let job = assembler.try_assemble().await.unwrap().unwrap();
        let ids: Vec<&str> = job.images.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(ids, vec!["src-1", "src-2", "src-3"]);
        assert!(buffer.lock().await.is_empty());
        assert!(store.contains_source(&SourceId::new("src-2")).await);
    }

    #[tokio::test]
    async fn test_count_fire_leaves_residual_buffer() {
        let (buffer, _store, assembler) = setup(policy(3, 600)).await;
        for n in 1..=5 {
            buffer.lock().await.push(image_at(n, Utc::now()));
        }

        let job = assembler.try_assemble().await.unwrap().unwrap();
        assert_eq!(job.images.len(), 3);
        assert_eq!(buffer.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_time_fire_takes_single_old_image() {
        let (buffer, _store, assembler) = setup(policy(3, 60)).await;
        let old = Utc::now() - chrono::Duration::seconds(120);
        buffer.lock().await.push(image_at(1, old));

        let job = assembler.try_assemble().await.unwrap().unwrap();
        assert_eq!(job.images.len(), 1);
        assert_eq!(job.images[0].source_id.as_str(), "src-1");
    }

    #[tokio::test]
    async fn test_time_fire_waits_for_window() {
        let (buffer, _store, assembler) = setup(policy(3, 60)).await;
        buffer.lock().await.push(image_at(1, Utc::now()));

        // Fresh image, below count threshold: nothing fires.
        assert!(assembler.try_assemble().await.unwrap().is_none());
        assert_eq!(buffer.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_drain_cuts_multiple_batches() {
        let (buffer, _store, assembler) = setup(policy(2, 600)).await;
        for n in 1..=5 {
            buffer.lock().await.push(image_at(n, Utc::now()));
        }

        let jobs = assembler.drain().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(buffer.lock().await.len(), 1);
    }
}
