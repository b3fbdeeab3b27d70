//! Event intake: normalization and dedup of posted images.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use shortcast_models::{ImageRef, SourceId};
use shortcast_store::JobStore;

use crate::buffer::SharedBuffer;

/// Outcome of submitting an image event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Duplicate,
}

/// Accepts `ImagePosted` events, dedups by source ID and appends to
/// the shared pending buffer.
///
/// Delivery from the source is at-least-once; replays are rejected
/// here against both the buffer and the job store's index.
#[derive(Clone)]
pub struct EventIntake {
    buffer: SharedBuffer,
    store: Arc<JobStore>,
}

impl EventIntake {
    pub fn new(buffer: SharedBuffer, store: Arc<JobStore>) -> Self {
        Self { buffer, store }
    }

    /// Submit one image event.
    ///
    /// No persistence happens here; durability starts once the batch
    /// assembler consumes the buffer into a job.
    pub async fn submit(
        &self,
        source_id: SourceId,
        uri: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Admission {
        // Both dedup checks run under the buffer lock. The assembler
        // drains the buffer and creates the job under this same lock,
        // so a replay cannot land in the window between the drain and
        // the store index picking up the source.
        let mut buffer = self.buffer.lock().await;

        if self.store.contains_source(&source_id).await {
            debug!(source_id = %source_id, "Duplicate image rejected (already assigned to a job)");
            return Admission::Duplicate;
        }

        if buffer.contains_source(&source_id) {
            debug!(source_id = %source_id, "Duplicate image rejected (already buffered)");
            return Admission::Duplicate;
        }

        buffer.push(ImageRef::new(source_id.clone(), uri, received_at));
        info!(source_id = %source_id, buffered = buffer.len(), "Accepted image");
        Admission::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::batcher::{BatchAssembler, BatchPolicy};
    use crate::buffer::shared_buffer;

    async fn store() -> Arc<JobStore> {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path()).await.unwrap();
        // Leak the tempdir so the store path outlives the test setup.
        std::mem::forget(dir);
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_accepts_then_rejects_replay() {
        let buffer = shared_buffer();
        let intake = EventIntake::new(Arc::clone(&buffer), store().await);

        let now = Utc::now();
        assert_eq!(
            intake.submit(SourceId::new("msg-1"), "/tmp/a.jpg", now).await,
            Admission::Accepted
        );
        assert_eq!(
            intake.submit(SourceId::new("msg-1"), "/tmp/a.jpg", now).await,
            Admission::Duplicate
        );
        assert_eq!(buffer.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_source_already_in_store() {
        let buffer = shared_buffer();
        let store = store().await;

        let job = shortcast_models::VideoJob::new(vec![ImageRef::new(
            SourceId::new("msg-9"),
            "/tmp/a.jpg",
            Utc::now(),
        )]);
        store.create(job).await.unwrap();

        let intake = EventIntake::new(Arc::clone(&buffer), store);
        assert_eq!(
            intake.submit(SourceId::new("msg-9"), "/tmp/a.jpg", Utc::now()).await,
            Admission::Duplicate
        );
        assert!(buffer.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_replay_racing_assembly_never_forms_second_job() {
        let buffer = shared_buffer();
        let store = store().await;
        let intake = EventIntake::new(Arc::clone(&buffer), Arc::clone(&store));
        let assembler = BatchAssembler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            BatchPolicy {
                min_images: 1,
                max_wait: Duration::from_secs(600),
            },
        );

        // Redeliveries hammer the same source while the assembler cuts
        // its batch; the image must end up owned by exactly one job.
        for n in 0..200u32 {
            let source = SourceId::new(format!("img-{n}"));
            intake
                .submit(source.clone(), format!("/tmp/{n}.jpg"), Utc::now())
                .await;

            let replayer = {
                let intake = intake.clone();
                let source = source.clone();
                tokio::spawn(async move {
                    for _ in 0..5 {
                        intake
                            .submit(source.clone(), "/tmp/replay.jpg", Utc::now())
                            .await;
                    }
                })
            };
            assembler.try_assemble().await.unwrap();
            replayer.await.unwrap();
        }

        // Flush any stragglers the replays might have buffered.
        assembler.drain().await.unwrap();

        let mut owners: HashMap<String, usize> = HashMap::new();
        for job in store.list_all().await {
            for image in &job.images {
                *owners.entry(image.source_id.to_string()).or_default() += 1;
            }
        }
        for (source, jobs) in &owners {
            assert_eq!(*jobs, 1, "source {source} assigned to {jobs} jobs");
        }
        assert_eq!(owners.len(), 200);
    }
}
