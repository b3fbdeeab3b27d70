//! Durable job store.
//!
//! Single source of truth for "has this been processed": every job and
//! its lifecycle state, plus a `source_id -> job_id` index used for
//! dedup across restarts.

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::JobStore;
