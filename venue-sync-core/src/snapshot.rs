//! Identity-keyed snapshot of tracked venues.
//!
//! The snapshot is an upsert/tombstone view of current truth. Merging a change
//! set never appends history; it only replaces or removes records.
use std::collections::BTreeMap;

use crate::change::ChangeSet;
use crate::venue::{VenueKey, VenueRecord};

/// Result of merging one change set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Records inserted or replaced, in key order.
    pub changed: Vec<VenueRecord>,
    /// Records that did not exist before the merge.
    pub created_count: usize,
    /// Existing records whose coordinates or tags changed.
    pub modified_count: usize,
    /// Existing records removed by the merge.
    pub removed_count: usize,
}

impl MergeOutcome {
    /// Whether the merge left the snapshot untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty() && self.removed_count == 0
    }
}

#[derive(Debug)]
struct Touched {
    record: VenueRecord,
    existed_before: bool,
}

/// The full set of tracked venues.
///
/// # Examples
/// ```
/// use venue_sync_core::{ChangeAction, ChangeRecord, ChangeSet, ElementKind, Tags, VenueSnapshot};
///
/// let mut tags = Tags::new();
/// tags.insert("payment:lightning".into(), "yes".into());
/// let mut changes = ChangeSet::default();
/// changes.route(
///     ChangeAction::Create,
///     ChangeRecord { id: 42, kind: ElementKind::Node, lat: Some(10.0), lon: Some(20.0), tags },
/// );
///
/// let mut snapshot = VenueSnapshot::default();
/// let outcome = snapshot.apply(&changes);
/// assert_eq!(outcome.created_count, 1);
/// assert_eq!(snapshot.len(), 1);
///
/// let again = snapshot.apply(&changes);
/// assert!(again.is_noop());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueSnapshot {
    venues: BTreeMap<VenueKey, VenueRecord>,
}

impl VenueSnapshot {
    /// Build a snapshot from stored records; later duplicates replace earlier ones.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = VenueRecord>,
    {
        Self {
            venues: records
                .into_iter()
                .map(|record| (record.key(), record))
                .collect(),
        }
    }

    /// Number of tracked venues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.venues.len()
    }

    /// Whether no venues are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }

    /// Look up a venue by identity.
    #[must_use]
    pub fn get(&self, key: &VenueKey) -> Option<&VenueRecord> {
        self.venues.get(key)
    }

    /// Whether a venue with this identity is tracked.
    #[must_use]
    pub fn contains(&self, key: &VenueKey) -> bool {
        self.venues.contains_key(key)
    }

    /// Iterate venues in key order.
    pub fn iter(&self) -> impl Iterator<Item = &VenueRecord> {
        self.venues.values()
    }

    /// Consume the snapshot, returning records in key order.
    #[must_use]
    pub fn into_records(self) -> Vec<VenueRecord> {
        self.venues.into_values().collect()
    }

    /// Merge a classified change set.
    ///
    /// Upserts (`created` and `modified`) are applied first and only when the
    /// record is new or its coordinates or tags differ. Removals (`deleted` and
    /// `unqualified_modified`) follow. A record both upserted and removed in the
    /// same change set is absent afterwards and is not reported as changed.
    /// Change sets built with [`ChangeSet::route`] already hold only the last
    /// version of each element, so document order is resolved before this.
    pub fn apply(&mut self, changes: &ChangeSet) -> MergeOutcome {
        let mut touched: BTreeMap<VenueKey, Touched> = BTreeMap::new();

        for change in changes.upserts() {
            let candidate = change.to_venue();
            let key = candidate.key();
            let existed_before = match self.venues.get(&key) {
                Some(existing) if existing.same_content(&candidate) => continue,
                Some(_) => true,
                None => false,
            };
            self.venues.insert(key, candidate.clone());
            touched
                .entry(key)
                .and_modify(|entry| entry.record = candidate.clone())
                .or_insert(Touched {
                    record: candidate,
                    existed_before,
                });
        }

        let mut removed_count = 0;
        for change in changes.removals() {
            let key = change.key();
            if self.venues.remove(&key).is_none() {
                continue;
            }
            match touched.remove(&key) {
                Some(entry) if !entry.existed_before => {}
                _ => removed_count += 1,
            }
        }

        let mut outcome = MergeOutcome {
            removed_count,
            ..MergeOutcome::default()
        };
        for entry in touched.into_values() {
            if entry.existed_before {
                outcome.modified_count += 1;
            } else {
                outcome.created_count += 1;
            }
            outcome.changed.push(entry.record);
        }
        outcome
    }
}
