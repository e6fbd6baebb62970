//! Test helpers for preparing data directories.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::fs;
use tempfile::TempDir;
use venue_sync_core::{ElementKind, SequenceNumber, Tags, VenueRecord};
use venue_sync_data::queue::EmitOutcome;
use venue_sync_data::sync::AppliedSequence;
use venue_sync_data::SyncLog;

use crate::config::DataDir;

pub(super) struct DataDirFixture {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl DataDirFixture {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().join("data")).expect("utf-8 workspace");
        fs::create_dir_all(root.as_std_path()).expect("create data directory");
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8PathBuf {
        &self.root
    }

    pub(super) fn data_dir(&self) -> DataDir {
        DataDir::new(self.root.clone())
    }

    /// Write a replication state, `venues` cached nodes, and one sync log entry.
    pub(super) fn synchronise(&self, sequence: u64, venues: i64) {
        let data_dir = self.data_dir();
        let state = format!(r#"{{"sequence_number":{sequence},"timestamp":"2024-05-02T08:00:00Z"}}"#);
        fs::write(data_dir.state_path().as_std_path(), state).expect("write state");

        let mut tags = Tags::new();
        tags.insert("payment:bitcoin".to_owned(), "yes".to_owned());
        let records: Vec<VenueRecord> = (1..=venues)
            .map(|id| VenueRecord::new(ElementKind::Node, id, Some(1.0), Some(2.0), tags.clone()))
            .collect();
        let cache = serde_json::to_vec_pretty(&records).expect("serialise cache");
        fs::write(data_dir.cache_path().as_std_path(), cache).expect("write cache");

        let log = SyncLog::initialise(data_dir.sync_log_path().as_std_path())
            .expect("initialise sync log");
        log.record(&AppliedSequence {
            sequence: SequenceNumber::new(sequence),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            created_count: usize::try_from(venues).expect("venue count fits"),
            modified_count: 0,
            removed_count: 0,
            skipped: 0,
            cache_written: true,
            rejected: false,
            emitted: EmitOutcome::Skipped,
        })
        .expect("record applied sequence");
    }
}
