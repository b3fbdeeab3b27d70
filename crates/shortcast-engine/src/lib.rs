//! Scheduling and orchestration engine.
//!
//! Turns a stream of posted images into published short videos:
//! intake dedups and buffers images, the batch assembler cuts jobs,
//! the pipeline runner drives each job through compose and publish
//! with retry/backoff, and the scheduler loop is the single active
//! driver with admission control over in-flight stages.

pub mod backoff;
mod batcher;
mod buffer;
mod config;
mod error;
mod intake;
mod pipeline;
mod runner;
mod scheduler;
mod titles;

pub use batcher::{BatchAssembler, BatchPolicy};
pub use buffer::{shared_buffer, PendingBuffer, SharedBuffer};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use intake::{Admission, EventIntake};
pub use pipeline::{Compositor, Notifier, Publisher};
pub use runner::{PipelineRunner, PublishDefaults};
pub use scheduler::Scheduler;
pub use titles::TitlePicker;
