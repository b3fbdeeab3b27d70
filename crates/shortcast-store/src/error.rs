//! Store error types.

use shortcast_models::JobId;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The job does not exist. Surfaced as a consistency error, never
    /// auto-healed.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// A concurrent update advanced the job past the caller's base
    /// version. Callers retry the read-modify-write.
    #[error("Conflict on job {id}: expected version {expected}, found {actual}")]
    Conflict {
        id: JobId,
        expected: u64,
        actual: u64,
    },

    /// A job with this ID already exists.
    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
