//! Scheduler loop: the single active driver of the pipeline.
//!
//! Each tick cuts any ready batches and dispatches eligible jobs to
//! the runner on spawned tasks. A semaphore bounds in-flight stage
//! invocations (admission control for the compositor and the sink's
//! rate limits) and a claimed-set guarantees one executor per job.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use shortcast_models::{JobId, JobState};
use shortcast_store::JobStore;

use crate::batcher::BatchAssembler;
use crate::config::EngineConfig;
use crate::runner::PipelineRunner;

pub struct Scheduler {
    store: Arc<JobStore>,
    assembler: BatchAssembler,
    runner: Arc<PipelineRunner>,
    config: EngineConfig,
    stage_semaphore: Arc<Semaphore>,
    claimed: Arc<Mutex<HashSet<JobId>>>,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        store: Arc<JobStore>,
        assembler: BatchAssembler,
        runner: Arc<PipelineRunner>,
        config: EngineConfig,
    ) -> Self {
        let stage_semaphore = Arc::new(Semaphore::new(config.max_concurrent_stages));
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            assembler,
            runner,
            config,
            stage_semaphore,
            claimed: Arc::new(Mutex::new(HashSet::new())),
            shutdown,
        }
    }

    /// Run ticks until shutdown, then drain in-flight stages.
    pub async fn run(&self) {
        info!(
            tick_interval = ?self.config.tick_interval,
            max_concurrent_stages = self.config.max_concurrent_stages,
            "Starting scheduler loop"
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.config.tick_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping scheduler");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Waiting for in-flight stages to finish...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_stages())
            .await
            .is_err()
        {
            warn!("Shutdown drain timed out with stages still in flight");
        }
        info!("Scheduler stopped");
    }

    /// One scheduling pass: assemble batches, dispatch eligible jobs.
    ///
    /// A failing job or a failing batch write never stops the loop.
    pub async fn tick(&self) {
        match self.assembler.drain().await {
            Ok(jobs) if !jobs.is_empty() => {
                debug!(assembled = jobs.len(), "Batch assembly produced jobs");
            }
            Ok(_) => {}
            Err(e) => error!("Batch assembly failed: {}", e),
        }

        let now = Utc::now();
        for job in self.store.list_active().await {
            if !job.is_eligible(now) {
                continue;
            }
            if !matches!(job.state, JobState::Pending | JobState::Composed) {
                continue;
            }

            // Admission control: stop dispatching once the cap is hit.
            let permit = match Arc::clone(&self.stage_semaphore).try_acquire_owned() {
                Ok(p) => p,
                Err(_) => break,
            };

            {
                let mut claimed = self.claimed.lock().await;
                if !claimed.insert(job.id.clone()) {
                    // Another executor still owns this job.
                    drop(permit);
                    continue;
                }
            }

            let runner = Arc::clone(&self.runner);
            let claimed = Arc::clone(&self.claimed);
            let id = job.id.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match runner.advance(&id).await {
                    Ok(state) => debug!(job_id = %id, state = %state, "Stage finished"),
                    Err(e) => error!(job_id = %id, "Stage dispatch failed: {}", e),
                }
                claimed.lock().await.remove(&id);
            });
        }
    }

    async fn wait_for_stages(&self) {
        loop {
            if self.stage_semaphore.available_permits() == self.config.max_concurrent_stages {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal the loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
