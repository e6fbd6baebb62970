use thiserror::Error;
use venue_sync_core::SequenceNumber;

use crate::cache::CacheError;
use crate::osc::ClassifyError;
use crate::queue::QueueError;
use crate::replication::ReplicationError;
use crate::state::StateError;

/// Errors that stop a synchronisation pass.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// The upstream high-water mark could not be determined.
    #[error("failed to read the upstream high-water mark: {source}")]
    HighWaterMark { source: ReplicationError },
    /// The diff for a sequence could not be retrieved.
    #[error("failed to fetch sequence {sequence}: {source}")]
    Fetch {
        sequence: SequenceNumber,
        source: ReplicationError,
    },
    /// The diff for a sequence could not be classified.
    #[error("failed to classify sequence {sequence}: {source}")]
    Classify {
        sequence: SequenceNumber,
        source: ClassifyError,
    },
    /// The venue cache could not be updated.
    #[error("failed to apply sequence {sequence} to the venue cache: {source}")]
    Cache {
        sequence: SequenceNumber,
        source: CacheError,
    },
    /// The enrichment batch could not be queued.
    #[error("failed to queue enrichment batch for sequence {sequence}: {source}")]
    Queue {
        sequence: SequenceNumber,
        source: QueueError,
    },
    /// The replication cursor could not be advanced.
    #[error("failed to record sequence {sequence} as consumed: {source}")]
    State {
        sequence: SequenceNumber,
        source: StateError,
    },
}

impl SyncError {
    /// Sequence being processed when the error occurred.
    #[must_use]
    pub const fn sequence(&self) -> Option<SequenceNumber> {
        match self {
            Self::HighWaterMark { .. } => None,
            Self::Fetch { sequence, .. }
            | Self::Classify { sequence, .. }
            | Self::Cache { sequence, .. }
            | Self::Queue { sequence, .. }
            | Self::State { sequence, .. } => Some(*sequence),
        }
    }
}
