//! Restart and dedup behavior across a store reload.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use shortcast_engine::{Admission, BatchAssembler, BatchPolicy, EventIntake, shared_buffer};
use shortcast_models::{JobState, SourceId, StageKind};
use shortcast_store::JobStore;

#[tokio::test]
async fn test_restart_mid_compose_resumes_without_rebatching() {
    let dir = tempfile::tempdir().unwrap();

    // First process lifetime: batch three images and crash mid-compose.
    let job_id = {
        let store = Arc::new(JobStore::open(dir.path()).await.unwrap());
        let buffer = shared_buffer();
        let intake = EventIntake::new(Arc::clone(&buffer), Arc::clone(&store));
        let assembler = BatchAssembler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            BatchPolicy { min_images: 3, max_wait: Duration::from_secs(600) },
        );

        for n in 1..=3 {
            assert_eq!(
                intake
                    .submit(SourceId::new(format!("msg-{n}")), format!("/tmp/{n}.jpg"), Utc::now())
                    .await,
                Admission::Accepted
            );
        }

        let job = assembler.try_assemble().await.unwrap().unwrap();
        store
            .update(&job.id, job.version, |j| j.begin(StageKind::Compose))
            .await
            .unwrap();
        job.id
        // Store dropped here: simulated crash while Composing.
    };

    // Second process lifetime.
    let store = Arc::new(JobStore::open(dir.path()).await.unwrap());
    let buffer = shared_buffer();
    let intake = EventIntake::new(Arc::clone(&buffer), Arc::clone(&store));

    // The in-flight stage rolled back to its last committed retry point.
    let job = store.get(&job_id).await.unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.images.len(), 3);

    // Replayed source events must not form a second job.
    for n in 1..=3 {
        assert_eq!(
            intake
                .submit(SourceId::new(format!("msg-{n}")), format!("/tmp/{n}.jpg"), Utc::now())
                .await,
            Admission::Duplicate
        );
    }
    assert!(buffer.lock().await.is_empty());
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_image_order_survives_batching_and_reload() {
    let dir = tempfile::tempdir().unwrap();

    let job_id = {
        let store = Arc::new(JobStore::open(dir.path()).await.unwrap());
        let buffer = shared_buffer();
        let intake = EventIntake::new(Arc::clone(&buffer), Arc::clone(&store));
        let assembler = BatchAssembler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            BatchPolicy { min_images: 4, max_wait: Duration::from_secs(600) },
        );

        for n in ["a", "b", "c", "d"] {
            intake
                .submit(SourceId::new(format!("msg-{n}")), format!("/tmp/{n}.jpg"), Utc::now())
                .await;
        }
        assembler.try_assemble().await.unwrap().unwrap().id
    };

    let store = JobStore::open(dir.path()).await.unwrap();
    let job = store.get(&job_id).await.unwrap();
    let order: Vec<&str> = job.images.iter().map(|i| i.source_id.as_str()).collect();
    assert_eq!(order, vec!["msg-a", "msg-b", "msg-c", "msg-d"]);
}
