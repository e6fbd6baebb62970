//! Hand-off of changed venues to the enrichment stage.
//!
//! Each processed sequence produces at most one batch. Batches are
//! write-once: a batch that already exists is never rewritten, so replaying a
//! sequence after a crash cannot duplicate or clobber queued work.

use std::{io, path::PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use thiserror::Error;
use venue_sync_core::{EnrichmentBatch, SequenceNumber};

/// Errors raised while queueing a batch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    /// The batch could not be serialised.
    #[error("failed to serialise enrichment batch {sequence}: {source}")]
    Serialise {
        sequence: SequenceNumber,
        source: serde_json::Error,
    },
    /// The batch file could not be written.
    #[error("failed to write enrichment batch {path:?}: {source}")]
    Write { source: io::Error, path: PathBuf },
}

/// What [`EnrichmentQueue::emit`] did with a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The batch was empty; nothing was written.
    Skipped,
    /// The batch was written to the given location.
    Written(Utf8PathBuf),
    /// A batch for this sequence was already queued and was left untouched.
    AlreadyQueued(Utf8PathBuf),
}

/// Destination for enrichment batches.
pub trait EnrichmentQueue {
    /// Queue `batch` for the enrichment stage.
    fn emit(&self, batch: &EnrichmentBatch) -> Result<EmitOutcome, QueueError>;
}

/// Queue that writes one JSON file per sequence into a directory.
///
/// # Examples
/// ```
/// # use tempfile::tempdir;
/// # use camino::Utf8PathBuf;
/// # use venue_sync_core::{EnrichmentBatch, SequenceNumber};
/// # use venue_sync_data::queue::{DirectoryQueue, EmitOutcome, EnrichmentQueue};
/// let temp = tempdir().unwrap();
/// let dir = Utf8PathBuf::from_path_buf(temp.path().join("queue")).unwrap();
/// let queue = DirectoryQueue::new(dir);
///
/// let empty = EnrichmentBatch::new(SequenceNumber::new(101), Vec::new());
/// assert_eq!(queue.emit(&empty).unwrap(), EmitOutcome::Skipped);
/// assert_eq!(
///     queue.batch_path(SequenceNumber::new(101)).file_name(),
///     Some("batch-000000101.json"),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryQueue {
    dir: Utf8PathBuf,
}

impl DirectoryQueue {
    /// Queue batches into `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory receiving batches.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Location of the batch for `sequence`.
    #[must_use]
    pub fn batch_path(&self, sequence: SequenceNumber) -> Utf8PathBuf {
        self.dir.join(format!("batch-{:09}.json", sequence.get()))
    }
}

impl EnrichmentQueue for DirectoryQueue {
    fn emit(&self, batch: &EnrichmentBatch) -> Result<EmitOutcome, QueueError> {
        if batch.is_empty() {
            debug!("no changed venues in sequence {}; nothing queued", batch.sequence);
            return Ok(EmitOutcome::Skipped);
        }
        let path = self.batch_path(batch.sequence);
        let bytes = serde_json::to_vec_pretty(batch).map_err(|source| QueueError::Serialise {
            sequence: batch.sequence,
            source,
        })?;
        let written = venue_sync_fs::write_new_atomic(&path, &bytes).map_err(|source| {
            QueueError::Write {
                source,
                path: path.clone().into_std_path_buf(),
            }
        })?;
        if written {
            info!(
                "queued {} venues from sequence {} at {path}",
                batch.entries.len(),
                batch.sequence
            );
            Ok(EmitOutcome::Written(path))
        } else {
            info!("batch for sequence {} already queued at {path}", batch.sequence);
            Ok(EmitOutcome::AlreadyQueued(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::fs;
    use tempfile::TempDir;
    use venue_sync_core::test_support::bitcoin_venue;

    #[fixture]
    fn queue() -> (TempDir, DirectoryQueue) {
        let dir = TempDir::new().expect("create temporary directory");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("queue"))
            .expect("temporary directory should be UTF-8");
        (dir, DirectoryQueue::new(path))
    }

    #[rstest]
    fn empty_batches_write_nothing(queue: (TempDir, DirectoryQueue)) {
        let (_guard, queue) = queue;
        let outcome = queue
            .emit(&EnrichmentBatch::new(SequenceNumber::new(101), Vec::new()))
            .expect("emit");
        assert_eq!(outcome, EmitOutcome::Skipped);
        assert!(!queue.dir().exists(), "directory is only created on write");
    }

    #[rstest]
    fn writes_sequence_stamped_batches(queue: (TempDir, DirectoryQueue)) {
        let (_guard, queue) = queue;
        let batch = EnrichmentBatch::new(
            SequenceNumber::new(100),
            vec![bitcoin_venue(42, 10.0, 20.0)],
        );
        let outcome = queue.emit(&batch).expect("emit");
        let path = queue.dir().join("batch-000000100.json");
        assert_eq!(outcome, EmitOutcome::Written(path.clone()));
        let stored: EnrichmentBatch =
            serde_json::from_slice(&fs::read(&path).expect("read batch")).expect("parse batch");
        assert_eq!(stored, batch);
    }

    #[rstest]
    fn existing_batches_are_never_rewritten(queue: (TempDir, DirectoryQueue)) {
        let (_guard, queue) = queue;
        let first = EnrichmentBatch::new(SequenceNumber::new(7), vec![bitcoin_venue(1, 1.0, 1.0)]);
        let replay = EnrichmentBatch::new(SequenceNumber::new(7), vec![bitcoin_venue(2, 2.0, 2.0)]);
        queue.emit(&first).expect("emit first");
        let path = queue.batch_path(SequenceNumber::new(7));
        let before = fs::read(&path).expect("read batch");

        let outcome = queue.emit(&replay).expect("emit replay");
        assert_eq!(outcome, EmitOutcome::AlreadyQueued(path.clone()));
        assert_eq!(fs::read(&path).expect("read batch"), before);
    }
}
