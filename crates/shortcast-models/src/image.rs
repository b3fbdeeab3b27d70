//! Ingested image records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SourceId;

/// Canonical record of one ingested image.
///
/// Immutable once created. Owned by the intake buffer until consumed
/// into a job, thereafter by that job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Identifier from the ingestion source (dedup key)
    pub source_id: SourceId,
    /// Location of the stored image bytes
    pub uri: String,
    /// When the image was received
    pub received_at: DateTime<Utc>,
}

impl ImageRef {
    pub fn new(source_id: SourceId, uri: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            source_id,
            uri: uri.into(),
            received_at,
        }
    }
}
