use serde::{Deserialize, Serialize};

use crate::replication::SequenceNumber;
use crate::venue::VenueRecord;

/// Records changed by one replication sequence, handed to enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentBatch {
    /// Sequence that produced the changes.
    pub sequence: SequenceNumber,
    /// Changed venues in key order.
    pub entries: Vec<VenueRecord>,
}

impl EnrichmentBatch {
    /// Construct a batch.
    #[must_use]
    pub const fn new(sequence: SequenceNumber, entries: Vec<VenueRecord>) -> Self {
        Self { sequence, entries }
    }

    /// Whether the batch carries no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
