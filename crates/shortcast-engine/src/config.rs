//! Engine configuration.

use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Buffered images needed to cut a batch on the count condition
    pub min_images_per_batch: usize,
    /// Oldest-image age that cuts a batch regardless of count
    pub max_batch_wait: Duration,
    /// Attempts per stage before a job fails
    pub max_stage_attempts: u32,
    /// Base delay for exponential stage backoff (doubles per attempt)
    pub backoff_base: Duration,
    /// Cap on the stage backoff delay
    pub backoff_max: Duration,
    /// Maximum concurrent in-flight stage invocations
    pub max_concurrent_stages: usize,
    /// Scheduler tick interval
    pub tick_interval: Duration,
    /// Timeout for one compositor or publisher call
    pub stage_timeout: Duration,
    /// Graceful shutdown drain timeout
    pub shutdown_timeout: Duration,
    /// Directory holding the job store snapshot
    pub data_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_images_per_batch: 3,
            max_batch_wait: Duration::from_secs(60),
            max_stage_attempts: 5,
            backoff_base: Duration::from_secs(30),
            backoff_max: Duration::from_secs(900),
            max_concurrent_stages: 2,
            tick_interval: Duration::from_secs(5),
            stage_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            data_dir: "data/state".to_string(),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_images_per_batch: env_u64(
                "SHORTCAST_MIN_IMAGES_PER_BATCH",
                defaults.min_images_per_batch as u64,
            ) as usize,
            max_batch_wait: Duration::from_secs(env_u64(
                "SHORTCAST_MAX_BATCH_WAIT_SECS",
                defaults.max_batch_wait.as_secs(),
            )),
            max_stage_attempts: env_u64(
                "SHORTCAST_MAX_STAGE_ATTEMPTS",
                defaults.max_stage_attempts as u64,
            ) as u32,
            backoff_base: Duration::from_secs(env_u64(
                "SHORTCAST_BACKOFF_BASE_SECS",
                defaults.backoff_base.as_secs(),
            )),
            backoff_max: Duration::from_secs(env_u64(
                "SHORTCAST_BACKOFF_MAX_SECS",
                defaults.backoff_max.as_secs(),
            )),
            max_concurrent_stages: env_u64(
                "SHORTCAST_MAX_CONCURRENT_STAGES",
                defaults.max_concurrent_stages as u64,
            ) as usize,
            tick_interval: Duration::from_secs(env_u64(
                "SHORTCAST_TICK_INTERVAL_SECS",
                defaults.tick_interval.as_secs(),
            )),
            stage_timeout: Duration::from_secs(env_u64(
                "SHORTCAST_STAGE_TIMEOUT_SECS",
                defaults.stage_timeout.as_secs(),
            )),
            shutdown_timeout: Duration::from_secs(env_u64(
                "SHORTCAST_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )),
            data_dir: std::env::var("SHORTCAST_DATA_DIR").unwrap_or(defaults.data_dir),
        }
    }
}
