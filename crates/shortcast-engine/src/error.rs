//! Engine error types.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Compositor failure. Retryable up to the configured bound.
    #[error("Compose failed: {0}")]
    Compose(String),

    /// Publishing sink failure. Rate limits and transient network
    /// errors are retryable; credential and content rejections are
    /// terminal for the job.
    #[error("Publish failed: {message} (retryable: {retryable})")]
    Publish { message: String, retryable: bool },

    /// An external call exceeded its configured timeout.
    #[error("Stage timed out: {0}")]
    Timeout(String),

    /// The job was cancelled between stages.
    #[error("Job cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(#[from] shortcast_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn compose_failed(msg: impl Into<String>) -> Self {
        Self::Compose(msg.into())
    }

    pub fn publish_retryable(msg: impl Into<String>) -> Self {
        Self::Publish {
            message: msg.into(),
            retryable: true,
        }
    }

    pub fn publish_terminal(msg: impl Into<String>) -> Self {
        Self::Publish {
            message: msg.into(),
            retryable: false,
        }
    }

    pub fn timeout(stage: impl Into<String>) -> Self {
        Self::Timeout(stage.into())
    }

    /// Whether the owning stage may retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Compose(_) | EngineError::Timeout(_) | EngineError::Io(_) => true,
            EngineError::Publish { retryable, .. } => *retryable,
            EngineError::Cancelled | EngineError::Store(_) => false,
        }
    }
}
