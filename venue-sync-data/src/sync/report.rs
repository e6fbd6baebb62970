use chrono::{DateTime, Utc};
use venue_sync_core::SequenceNumber;

use super::SyncError;
use crate::queue::EmitOutcome;

/// Outcome of applying one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedSequence {
    /// Sequence applied.
    pub sequence: SequenceNumber,
    /// Timestamp published upstream for the sequence.
    pub timestamp: DateTime<Utc>,
    /// Venues created.
    pub created_count: usize,
    /// Venues modified.
    pub modified_count: usize,
    /// Venues removed.
    pub removed_count: usize,
    /// Entities skipped for missing ids or coordinates.
    pub skipped: usize,
    /// Whether the cache file was rewritten.
    pub cache_written: bool,
    /// Whether the never-empty guard discarded the merge.
    pub rejected: bool,
    /// What happened to the enrichment batch.
    pub emitted: EmitOutcome,
}

impl AppliedSequence {
    /// Whether a batch for this sequence is in the queue.
    #[must_use]
    pub const fn emitted(&self) -> bool {
        matches!(
            self.emitted,
            EmitOutcome::Written(_) | EmitOutcome::AlreadyQueued(_)
        )
    }
}

/// Outcome of one pass over the missing sequences.
#[derive(Debug)]
pub struct SyncReport {
    /// Consumed sequence when the pass started.
    pub start: SequenceNumber,
    /// Newest sequence published upstream.
    pub high_water_mark: SequenceNumber,
    /// Sequences applied, in order.
    pub applied: Vec<AppliedSequence>,
    /// Failure that stopped the pass early.
    pub halted: Option<SyncError>,
}

impl SyncReport {
    pub(crate) const fn new(start: SequenceNumber, high_water_mark: SequenceNumber) -> Self {
        Self {
            start,
            high_water_mark,
            applied: Vec::new(),
            halted: None,
        }
    }

    /// Consumed sequence when the pass finished.
    #[must_use]
    pub fn consumed(&self) -> SequenceNumber {
        self.applied
            .last()
            .map_or(self.start, |applied| applied.sequence)
    }

    /// Whether the pass reached the upstream high-water mark.
    #[must_use]
    pub fn caught_up(&self) -> bool {
        self.halted.is_none() && self.consumed() >= self.high_water_mark
    }
}

/// Outcome of a bootstrap run.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    /// Passes run, in order.
    pub passes: Vec<SyncReport>,
}

impl BootstrapReport {
    /// Total sequences applied across all passes.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.passes.iter().map(|pass| pass.applied.len()).sum()
    }

    /// Failure that ended the run early, if any.
    #[must_use]
    pub fn halted(&self) -> Option<&SyncError> {
        self.passes.last().and_then(|pass| pass.halted.as_ref())
    }
}
