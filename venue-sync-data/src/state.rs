//! Durable replication cursor.
//!
//! The cursor lives in a local JSON file and is mirrored to the blob store
//! under [`STATE_BLOB`]. It only moves forward: [`StateTracker::advance`]
//! refuses to regress, and [`StateTracker::reconcile`] adopts whichever copy
//! is further ahead.

use std::{io, path::PathBuf, rc::Rc};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use thiserror::Error;
use venue_sync_core::{ReplicationState, SequenceNumber};

use crate::blob::BlobStore;

/// Blob name of the mirrored cursor.
pub const STATE_BLOB: &str = "replication-state.json";

/// Errors raised while persisting the cursor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateError {
    /// The local state file could not be read.
    #[error("failed to read replication state {path:?}: {source}")]
    Read { source: io::Error, path: PathBuf },
    /// The local state file could not be written.
    #[error("failed to write replication state {path:?}: {source}")]
    Write { source: io::Error, path: PathBuf },
    /// The state could not be serialised.
    #[error("failed to serialise replication state: {source}")]
    Serialise { source: serde_json::Error },
    /// The proposed state is behind the persisted one.
    #[error("refusing to move replication state back from {current} to {proposed}")]
    Regression {
        current: SequenceNumber,
        proposed: SequenceNumber,
    },
}

/// Result of comparing the local cursor with its mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The mirror was ahead and its state now lives locally.
    AdoptedRemote(ReplicationState),
    /// The local state was at least as far ahead as the mirror.
    KeptLocal(Option<ReplicationState>),
    /// The mirror could not be read or parsed; the local state stands.
    RemoteUnavailable(Option<ReplicationState>),
}

impl ReconcileOutcome {
    /// State in effect after reconciliation.
    #[must_use]
    pub const fn state(&self) -> Option<ReplicationState> {
        match *self {
            Self::AdoptedRemote(state) => Some(state),
            Self::KeptLocal(state) | Self::RemoteUnavailable(state) => state,
        }
    }

    /// Consumed sequence after reconciliation.
    #[must_use]
    pub fn consumed_sequence(&self) -> SequenceNumber {
        self.state()
            .map_or(SequenceNumber::ZERO, |state| state.sequence_number)
    }
}

/// Tracks how far the replication feed has been consumed.
pub struct StateTracker {
    path: Utf8PathBuf,
    mirror: Option<Rc<dyn BlobStore>>,
}

impl std::fmt::Debug for StateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTracker")
            .field("path", &self.path)
            .field("mirrored", &self.mirror.is_some())
            .finish()
    }
}

impl StateTracker {
    /// Track state in `path`, optionally mirrored to `mirror`.
    pub fn new(path: impl Into<Utf8PathBuf>, mirror: Option<Rc<dyn BlobStore>>) -> Self {
        Self {
            path: path.into(),
            mirror,
        }
    }

    /// Location of the local state file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The locally persisted state.
    ///
    /// A file that does not parse is logged and treated as absent, so the
    /// worst outcome is replaying diffs that were already applied.
    pub fn current(&self) -> Result<Option<ReplicationState>, StateError> {
        let bytes = venue_sync_fs::read_if_exists(&self.path).map_err(|source| {
            StateError::Read {
                source,
                path: self.path.clone().into_std_path_buf(),
            }
        })?;
        Ok(bytes.and_then(|raw| decode_state(raw, self.path.as_str())))
    }

    /// Last sequence fully applied, or zero if none has been.
    #[must_use]
    pub fn consumed_sequence(&self) -> SequenceNumber {
        match self.current() {
            Ok(state) => state.map_or(SequenceNumber::ZERO, |value| value.sequence_number),
            Err(err) => {
                warn!("{err}; replaying from the start");
                SequenceNumber::ZERO
            }
        }
    }

    /// Persist `state` locally, then mirror it.
    ///
    /// Re-recording the current sequence is accepted. Mirror failures are
    /// logged and do not fail the call.
    pub async fn advance(&self, state: ReplicationState) -> Result<(), StateError> {
        if let Some(current) = self.current()?
            && state.sequence_number < current.sequence_number
        {
            return Err(StateError::Regression {
                current: current.sequence_number,
                proposed: state.sequence_number,
            });
        }
        let bytes = self.write_local(&state)?;
        self.mirror_state(&bytes).await;
        debug!("replication state advanced to {}", state.sequence_number);
        Ok(())
    }

    /// Compare the local state with the mirror and keep the further one.
    ///
    /// Never fails: an unreadable mirror or an unwritable local slot leaves
    /// the local state in place.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let outcome = self.plan_reconcile().await;
        if let ReconcileOutcome::AdoptedRemote(remote) = outcome
            && let Err(err) = self.adopt(remote)
        {
            warn!("failed to adopt mirrored replication state: {err}");
            return ReconcileOutcome::RemoteUnavailable(self.current().ok().flatten());
        }
        outcome
    }

    /// Decide what [`StateTracker::reconcile`] would do without writing.
    pub async fn plan_reconcile(&self) -> ReconcileOutcome {
        let local = match self.current() {
            Ok(state) => state,
            Err(err) => {
                warn!("{err}; treating local replication state as absent");
                None
            }
        };
        let Some(remote) = self.fetch_remote().await else {
            return ReconcileOutcome::RemoteUnavailable(local);
        };
        match ReplicationState::furthest(local, Some(remote)) {
            Some(chosen) if local != Some(chosen) => ReconcileOutcome::AdoptedRemote(chosen),
            _ => ReconcileOutcome::KeptLocal(local),
        }
    }

    /// Write `state` into the local slot without consulting the mirror.
    pub fn adopt(&self, state: ReplicationState) -> Result<(), StateError> {
        self.write_local(&state)?;
        info!(
            "adopted mirrored replication state at sequence {}",
            state.sequence_number
        );
        Ok(())
    }

    async fn fetch_remote(&self) -> Option<ReplicationState> {
        let mirror = self.mirror.as_ref()?;
        match mirror.get(STATE_BLOB).await {
            Ok(Some(bytes)) => decode_state(bytes, STATE_BLOB),
            Ok(None) => {
                debug!("no mirrored replication state yet");
                None
            }
            Err(err) => {
                warn!("mirrored replication state unavailable: {err}");
                None
            }
        }
    }

    fn write_local(&self, state: &ReplicationState) -> Result<Vec<u8>, StateError> {
        let bytes =
            serde_json::to_vec_pretty(state).map_err(|source| StateError::Serialise { source })?;
        venue_sync_fs::write_atomic(&self.path, &bytes).map_err(|source| StateError::Write {
            source,
            path: self.path.clone().into_std_path_buf(),
        })?;
        Ok(bytes)
    }

    async fn mirror_state(&self, bytes: &[u8]) {
        let Some(mirror) = self.mirror.as_ref() else {
            return;
        };
        if let Err(err) = mirror.put(STATE_BLOB, bytes).await {
            warn!("failed to mirror replication state: {err}");
        }
    }
}

fn decode_state(mut bytes: Vec<u8>, origin: &str) -> Option<ReplicationState> {
    match simd_json::serde::from_slice::<ReplicationState>(&mut bytes) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!("ignoring unreadable replication state in {origin}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::replication::test_support::block_on_for_tests;
    use chrono::{DateTime, Utc};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        mirror: Rc<MemoryBlobStore>,
        tracker: StateTracker,
    }

    #[fixture]
    fn harness() -> Harness {
        let dir = TempDir::new().expect("create temporary directory");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("replication-state.json"))
            .expect("temporary directory should be UTF-8");
        let mirror = Rc::new(MemoryBlobStore::new());
        let shared: Rc<dyn BlobStore> = mirror.clone();
        let tracker = StateTracker::new(path, Some(shared));
        Harness {
            _dir: dir,
            mirror,
            tracker,
        }
    }

    fn state(sequence: u64) -> ReplicationState {
        ReplicationState::new(SequenceNumber::new(sequence), DateTime::<Utc>::UNIX_EPOCH)
    }

    fn mirror_json(sequence: u64) -> Vec<u8> {
        serde_json::to_vec(&state(sequence)).expect("serialise state")
    }

    #[rstest]
    fn fresh_tracker_has_consumed_nothing(harness: Harness) {
        assert_eq!(harness.tracker.consumed_sequence(), SequenceNumber::ZERO);
        assert_eq!(harness.tracker.current().expect("read state"), None);
    }

    #[rstest]
    fn advance_persists_and_mirrors(harness: Harness) {
        block_on_for_tests(harness.tracker.advance(state(100))).expect("advance");
        assert_eq!(harness.tracker.consumed_sequence(), SequenceNumber::new(100));
        assert!(harness.mirror.contents(STATE_BLOB).is_some());
    }

    #[rstest]
    fn advance_refuses_to_regress(harness: Harness) {
        block_on_for_tests(harness.tracker.advance(state(100))).expect("advance");
        let outcome = block_on_for_tests(harness.tracker.advance(state(99)));
        assert!(matches!(outcome, Err(StateError::Regression { .. })));
        assert_eq!(harness.tracker.consumed_sequence(), SequenceNumber::new(100));
    }

    #[rstest]
    fn mirror_outages_do_not_fail_advance(harness: Harness) {
        harness.mirror.set_available(false);
        block_on_for_tests(harness.tracker.advance(state(7))).expect("advance");
        assert_eq!(harness.tracker.consumed_sequence(), SequenceNumber::new(7));
        assert_eq!(harness.mirror.contents(STATE_BLOB), None);
    }

    #[rstest]
    fn corrupt_local_state_is_treated_as_absent(harness: Harness) {
        venue_sync_fs::write_atomic(harness.tracker.path(), b"{not json")
            .expect("write corrupt state");
        assert_eq!(harness.tracker.consumed_sequence(), SequenceNumber::ZERO);
    }

    #[rstest]
    #[case(Some(10), Some(25), 25)]
    #[case(Some(30), Some(25), 30)]
    #[case(None, Some(25), 25)]
    #[case(Some(25), Some(25), 25)]
    #[case(Some(12), None, 12)]
    fn reconcile_adopts_the_larger_sequence(
        harness: Harness,
        #[case] local: Option<u64>,
        #[case] remote: Option<u64>,
        #[case] expected: u64,
    ) {
        if let Some(sequence) = local {
            harness.tracker.adopt(state(sequence)).expect("seed local state");
        }
        if let Some(sequence) = remote {
            harness.mirror.insert(STATE_BLOB, mirror_json(sequence));
        }
        let outcome = block_on_for_tests(harness.tracker.reconcile());
        assert_eq!(outcome.consumed_sequence(), SequenceNumber::new(expected));
        assert_eq!(
            harness.tracker.consumed_sequence(),
            SequenceNumber::new(expected)
        );
        let adopted = matches!(outcome, ReconcileOutcome::AdoptedRemote(_));
        assert_eq!(adopted, remote.unwrap_or(0) > local.unwrap_or(0));
    }

    #[rstest]
    fn unreachable_mirror_keeps_local_state(harness: Harness) {
        harness.tracker.adopt(state(10)).expect("seed local state");
        harness.mirror.insert(STATE_BLOB, mirror_json(25));
        harness.mirror.set_available(false);
        let outcome = block_on_for_tests(harness.tracker.reconcile());
        assert_eq!(outcome, ReconcileOutcome::RemoteUnavailable(Some(state(10))));
    }

    #[rstest]
    fn garbled_mirror_keeps_local_state(harness: Harness) {
        harness.tracker.adopt(state(10)).expect("seed local state");
        harness.mirror.insert(STATE_BLOB, b"garbage".to_vec());
        let outcome = block_on_for_tests(harness.tracker.reconcile());
        assert_eq!(outcome, ReconcileOutcome::RemoteUnavailable(Some(state(10))));
    }
}
