//! Persistent venue cache.
//!
//! The cache is a JSON array of venue records sorted by identity. It is
//! rewritten atomically and only when its serialised form changes, then
//! mirrored best-effort under [`CACHE_BLOB`].

use std::{io, path::PathBuf, rc::Rc};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, error, info, warn};
use thiserror::Error;
use venue_sync_core::{ChangeSet, VenueRecord, VenueSnapshot};

use crate::blob::{BlobError, BlobStore};

/// Blob name of the mirrored cache.
pub const CACHE_BLOB: &str = "venues.json";

/// Errors raised while loading or persisting the cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The cache file could not be read.
    #[error("failed to read venue cache {path:?}: {source}")]
    Read { source: io::Error, path: PathBuf },
    /// The cache file exists but does not parse.
    #[error("venue cache {path:?} is corrupt: {source}")]
    Corrupt {
        source: simd_json::Error,
        path: PathBuf,
    },
    /// The cache could not be serialised.
    #[error("failed to serialise venue cache: {source}")]
    Serialise { source: serde_json::Error },
    /// The cache file could not be written.
    #[error("failed to write venue cache {path:?}: {source}")]
    Write { source: io::Error, path: PathBuf },
    /// Reading the mirrored cache failed.
    #[error("failed to read mirrored venue cache: {source}")]
    Mirror { source: BlobError },
    /// The mirrored cache does not parse.
    #[error("mirrored venue cache is corrupt: {source}")]
    MirrorCorrupt { source: simd_json::Error },
    /// The write would have replaced a non-empty cache with an empty one.
    #[error("refusing to replace the {existing} venues in {path:?} with an empty cache")]
    WouldEmpty { existing: usize, path: PathBuf },
}

/// Summary of one [`VenueCacheStore::apply_change_set`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Whether the cache file was rewritten.
    pub updated: bool,
    /// Whether the never-empty guard discarded the merge.
    pub rejected: bool,
    /// Venues added.
    pub created_count: usize,
    /// Venues whose coordinates or tags changed.
    pub modified_count: usize,
    /// Venues removed.
    pub removed_count: usize,
    /// Added or changed venues, in identity order, for enrichment.
    pub changed: Vec<VenueRecord>,
}

/// A merged cache awaiting [`VenueCacheStore::commit`].
#[derive(Debug)]
#[must_use = "staged changes are only written by `VenueCacheStore::commit`"]
pub struct StagedCache {
    report: ApplyReport,
    bytes: Option<Vec<u8>>,
}

impl StagedCache {
    /// What committing the merge will do.
    pub const fn report(&self) -> &ApplyReport {
        &self.report
    }
}

/// File-backed store for the venue snapshot.
pub struct VenueCacheStore {
    path: Utf8PathBuf,
    mirror: Option<Rc<dyn BlobStore>>,
}

impl std::fmt::Debug for VenueCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueCacheStore")
            .field("path", &self.path)
            .field("mirrored", &self.mirror.is_some())
            .finish()
    }
}

impl VenueCacheStore {
    /// Store the cache in `path`, optionally mirrored to `mirror`.
    pub fn new(path: impl Into<Utf8PathBuf>, mirror: Option<Rc<dyn BlobStore>>) -> Self {
        Self {
            path: path.into(),
            mirror,
        }
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Load the snapshot; a missing file is an empty cache.
    pub fn load(&self) -> Result<VenueSnapshot, CacheError> {
        self.read_snapshot().map(|(snapshot, _)| snapshot)
    }

    /// Merge `changes` into the cache and persist the result.
    ///
    /// A corrupt cache file fails the call and is left untouched. A merge
    /// that would empty a non-empty cache is discarded and reported with
    /// [`ApplyReport::rejected`].
    pub async fn apply_change_set(&self, changes: &ChangeSet) -> Result<ApplyReport, CacheError> {
        let staged = self.stage(changes)?;
        self.commit(staged).await
    }

    /// Merge `changes` against the current cache without writing anything.
    ///
    /// Until the result is passed to [`Self::commit`], staging the same
    /// change set again reports the same [`ApplyReport::changed`] records.
    pub fn stage(&self, changes: &ChangeSet) -> Result<StagedCache, CacheError> {
        let (mut snapshot, on_disk) = self.read_snapshot()?;
        let existing = snapshot.len();
        let outcome = snapshot.apply(changes);

        if existing > 0 && snapshot.is_empty() {
            error!(
                "refusing to empty the venue cache at {}: change set would remove all {existing} venues",
                self.path
            );
            return Ok(StagedCache {
                report: ApplyReport {
                    rejected: true,
                    ..ApplyReport::default()
                },
                bytes: None,
            });
        }

        let serialised = serialise(&snapshot)?;
        let updated = on_disk.as_deref() != Some(serialised.as_slice());
        debug!(
            "staged venue cache with {} venues; rewrite needed: {updated}",
            snapshot.len()
        );
        Ok(StagedCache {
            report: ApplyReport {
                updated,
                rejected: false,
                created_count: outcome.created_count,
                modified_count: outcome.modified_count,
                removed_count: outcome.removed_count,
                changed: outcome.changed,
            },
            bytes: updated.then_some(serialised),
        })
    }

    /// Persist a staged merge locally, then mirror it best-effort.
    pub async fn commit(&self, staged: StagedCache) -> Result<ApplyReport, CacheError> {
        let StagedCache { report, bytes } = staged;
        if let Some(contents) = bytes {
            self.write_local(&contents)?;
            self.mirror_cache(&contents).await;
            debug!("venue cache rewritten at {}", self.path);
        }
        Ok(report)
    }

    /// Replace the local cache with the mirrored copy.
    ///
    /// Returns the number of venues restored, or `None` if nothing is
    /// mirrored yet.
    pub async fn restore_from_mirror(&self) -> Result<Option<usize>, CacheError> {
        let Some(mirror) = self.mirror.as_ref() else {
            return Ok(None);
        };
        let Some(bytes) = mirror
            .get(CACHE_BLOB)
            .await
            .map_err(|source| CacheError::Mirror { source })?
        else {
            debug!("no mirrored venue cache to restore");
            return Ok(None);
        };
        let mut scratch = bytes.clone();
        let records: Vec<VenueRecord> = simd_json::serde::from_slice(&mut scratch)
            .map_err(|source| CacheError::MirrorCorrupt { source })?;
        let existing = self.load()?.len();
        if existing > 0 && records.is_empty() {
            return Err(CacheError::WouldEmpty {
                existing,
                path: self.path.clone().into_std_path_buf(),
            });
        }
        self.write_local(&bytes)?;
        info!(
            "restored {} venues from the mirror into {}",
            records.len(),
            self.path
        );
        Ok(Some(records.len()))
    }

    fn read_snapshot(&self) -> Result<(VenueSnapshot, Option<Vec<u8>>), CacheError> {
        let bytes = venue_sync_fs::read_if_exists(&self.path).map_err(|source| {
            CacheError::Read {
                source,
                path: self.path.clone().into_std_path_buf(),
            }
        })?;
        let Some(raw) = bytes else {
            return Ok((VenueSnapshot::default(), None));
        };
        let mut scratch = raw.clone();
        let records: Vec<VenueRecord> =
            simd_json::serde::from_slice(&mut scratch).map_err(|source| CacheError::Corrupt {
                source,
                path: self.path.clone().into_std_path_buf(),
            })?;
        Ok((VenueSnapshot::from_records(records), Some(raw)))
    }

    fn write_local(&self, bytes: &[u8]) -> Result<(), CacheError> {
        venue_sync_fs::write_atomic(&self.path, bytes).map_err(|source| CacheError::Write {
            source,
            path: self.path.clone().into_std_path_buf(),
        })
    }

    async fn mirror_cache(&self, bytes: &[u8]) {
        let Some(mirror) = self.mirror.as_ref() else {
            return;
        };
        if let Err(err) = mirror.put(CACHE_BLOB, bytes).await {
            warn!("failed to mirror venue cache: {err}");
        }
    }
}

fn serialise(snapshot: &VenueSnapshot) -> Result<Vec<u8>, CacheError> {
    let records: Vec<&VenueRecord> = snapshot.iter().collect();
    let mut bytes =
        serde_json::to_vec_pretty(&records).map_err(|source| CacheError::Serialise { source })?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::replication::test_support::block_on_for_tests;
    use rstest::{fixture, rstest};
    use std::fs;
    use tempfile::TempDir;
    use venue_sync_core::test_support::{bitcoin_node, deleted_node, tagged_node};
    use venue_sync_core::{ChangeAction, ChangeRecord, ElementKind, VenueKey};

    struct Harness {
        _dir: TempDir,
        mirror: Rc<MemoryBlobStore>,
        store: VenueCacheStore,
    }

    #[fixture]
    fn harness() -> Harness {
        let dir = TempDir::new().expect("create temporary directory");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("venues.json"))
            .expect("temporary directory should be UTF-8");
        let mirror = Rc::new(MemoryBlobStore::new());
        let shared: Rc<dyn BlobStore> = mirror.clone();
        Harness {
            _dir: dir,
            mirror,
            store: VenueCacheStore::new(path, Some(shared)),
        }
    }

    fn change_set(entries: Vec<(ChangeAction, ChangeRecord)>) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for (action, record) in entries {
            changes.route(action, record);
        }
        changes
    }

    fn apply(store: &VenueCacheStore, changes: &ChangeSet) -> ApplyReport {
        block_on_for_tests(store.apply_change_set(changes)).expect("apply change set")
    }

    fn seed(store: &VenueCacheStore) {
        apply(
            store,
            &change_set(vec![
                (ChangeAction::Create, bitcoin_node(1, 1.0, 1.0)),
                (ChangeAction::Create, bitcoin_node(2, 2.0, 2.0)),
            ]),
        );
    }

    #[rstest]
    fn missing_cache_loads_empty(harness: Harness) {
        assert!(harness.store.load().expect("load").is_empty());
    }

    #[rstest]
    fn applying_creates_and_mirrors(harness: Harness) {
        let report = apply(
            &harness.store,
            &change_set(vec![(ChangeAction::Create, bitcoin_node(42, 10.0, 20.0))]),
        );
        assert!(report.updated);
        assert_eq!(report.created_count, 1);
        assert_eq!(report.changed.len(), 1);
        let on_disk = fs::read(harness.store.path()).expect("cache written");
        assert_eq!(harness.mirror.contents(CACHE_BLOB), Some(on_disk));
    }

    #[rstest]
    fn reapplying_writes_nothing(harness: Harness) {
        let changes = change_set(vec![
            (ChangeAction::Create, bitcoin_node(3, 3.0, 3.0)),
            (ChangeAction::Modify, bitcoin_node(4, 4.0, 4.0)),
        ]);
        let first = apply(&harness.store, &changes);
        let before = fs::read(harness.store.path()).expect("cache written");
        let second = apply(&harness.store, &changes);
        assert!(first.updated);
        assert!(!second.updated);
        assert!(second.changed.is_empty());
        assert_eq!(fs::read(harness.store.path()).expect("cache readable"), before);
    }

    #[rstest]
    fn staging_writes_nothing_until_committed(harness: Harness) {
        let changes = change_set(vec![(ChangeAction::Create, bitcoin_node(42, 10.0, 20.0))]);

        let abandoned = harness.store.stage(&changes).expect("stage change set");
        drop(abandoned);
        assert!(!harness.store.path().exists());
        assert_eq!(harness.mirror.contents(CACHE_BLOB), None);

        let staged = harness.store.stage(&changes).expect("stage change set again");
        assert_eq!(staged.report().changed.len(), 1, "restaging must report the venue again");
        let report = block_on_for_tests(harness.store.commit(staged)).expect("commit");
        assert!(report.updated);
        assert!(
            harness
                .store
                .load()
                .expect("load")
                .contains(&VenueKey::new(ElementKind::Node, 42))
        );
    }

    #[rstest]
    fn never_empties_a_populated_cache(harness: Harness) {
        seed(&harness.store);
        let before = fs::read(harness.store.path()).expect("cache written");
        let report = apply(
            &harness.store,
            &change_set(vec![
                (ChangeAction::Delete, deleted_node(1)),
                (ChangeAction::Delete, deleted_node(2)),
            ]),
        );
        assert!(report.rejected);
        assert!(!report.updated);
        assert_eq!(fs::read(harness.store.path()).expect("cache readable"), before);
    }

    #[rstest]
    fn unqualified_modifications_remove_venues(harness: Harness) {
        seed(&harness.store);
        let report = apply(
            &harness.store,
            &change_set(vec![(
                ChangeAction::Modify,
                tagged_node(2, 2.0, 2.0, &[("payment:bitcoin", "no")]),
            )]),
        );
        assert_eq!(report.removed_count, 1);
        let snapshot = harness.store.load().expect("load");
        assert!(!snapshot.contains(&VenueKey::new(ElementKind::Node, 2)));
        assert_eq!(snapshot.len(), 1);
    }

    #[rstest]
    fn corrupt_cache_is_never_overwritten(harness: Harness) {
        fs::write(harness.store.path(), b"[{broken").expect("write corrupt cache");
        let outcome = block_on_for_tests(harness.store.apply_change_set(&change_set(vec![(
            ChangeAction::Create,
            bitcoin_node(9, 9.0, 9.0),
        )])));
        assert!(matches!(outcome, Err(CacheError::Corrupt { .. })));
        assert_eq!(
            fs::read(harness.store.path()).expect("cache readable"),
            b"[{broken"
        );
    }

    #[rstest]
    fn mirror_outage_does_not_fail_the_write(harness: Harness) {
        harness.mirror.set_available(false);
        let report = apply(
            &harness.store,
            &change_set(vec![(ChangeAction::Create, bitcoin_node(5, 5.0, 5.0))]),
        );
        assert!(report.updated);
        assert_eq!(harness.store.load().expect("load").len(), 1);
    }

    #[rstest]
    fn restores_the_mirrored_cache(harness: Harness) {
        let records = vec![bitcoin_node(8, 8.0, 8.0).to_venue()];
        harness
            .mirror
            .insert(CACHE_BLOB, serde_json::to_vec(&records).expect("serialise"));
        let restored = block_on_for_tests(harness.store.restore_from_mirror()).expect("restore");
        assert_eq!(restored, Some(1));
        let snapshot = harness.store.load().expect("load");
        assert!(snapshot.contains(&VenueKey::new(ElementKind::Node, 8)));
    }

    #[rstest]
    fn restoring_an_empty_mirror_keeps_local_venues(harness: Harness) {
        seed(&harness.store);
        harness.mirror.insert(CACHE_BLOB, b"[]".to_vec());
        let outcome = block_on_for_tests(harness.store.restore_from_mirror());
        assert!(matches!(outcome, Err(CacheError::WouldEmpty { existing: 2, .. })));
        assert_eq!(harness.store.load().expect("load").len(), 2);
    }

    #[rstest]
    fn nothing_mirrored_restores_nothing(harness: Harness) {
        let restored = block_on_for_tests(harness.store.restore_from_mirror()).expect("restore");
        assert_eq!(restored, None);
        assert!(!harness.store.path().exists());
    }
}
