//! Classified change sets produced from a single replication diff.
//!
//! The routing rules live here so that the parser only needs to decide which
//! section an entity came from.
use std::collections::BTreeMap;

use crate::tags::{Tags, is_domain_tagged};
use crate::venue::{ElementKind, VenueKey, VenueRecord};

/// Section of an osmChange document an entity appeared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// Entity created upstream.
    Create,
    /// Entity edited upstream.
    Modify,
    /// Entity removed upstream.
    Delete,
}

impl ChangeAction {
    /// Map an osmChange section name to its action.
    #[must_use]
    pub fn from_section_name(name: &[u8]) -> Option<Self> {
        match name {
            b"create" => Some(Self::Create),
            b"modify" => Some(Self::Modify),
            b"delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Whether entities in this section must carry coordinates.
    #[must_use]
    pub const fn requires_coordinates(self) -> bool {
        matches!(self, Self::Create | Self::Modify)
    }
}

/// Bucket a change record is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeClass {
    /// New and domain-tagged.
    Created,
    /// Edited and still domain-tagged.
    Modified,
    /// Removed upstream.
    Deleted,
    /// Edited and no longer domain-tagged; treated as a removal.
    UnqualifiedModified,
}

/// Entity touched by a replication diff.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Upstream identifier.
    pub id: i64,
    /// Upstream element kind.
    pub kind: ElementKind,
    /// Latitude in degrees, when supplied.
    pub lat: Option<f64>,
    /// Longitude in degrees, when supplied.
    pub lon: Option<f64>,
    /// Sanitised tags.
    pub tags: Tags,
}

impl ChangeRecord {
    /// Identity of the touched entity.
    #[must_use]
    pub const fn key(&self) -> VenueKey {
        VenueKey::new(self.kind, self.id)
    }

    /// Venue representation of this change.
    #[must_use]
    pub fn to_venue(&self) -> VenueRecord {
        VenueRecord::new(self.kind, self.id, self.lat, self.lon, self.tags.clone())
    }
}

/// Decide which bucket an entity belongs to.
///
/// Returns `None` when the entity is dropped: a creation that does not carry a
/// tracked payment tag is of no interest.
///
/// # Examples
/// ```
/// use venue_sync_core::{ChangeAction, ChangeClass, ChangeRecord, ElementKind, Tags, classify_record};
///
/// let mut tags = Tags::new();
/// tags.insert("payment:bitcoin".into(), "no".into());
/// let record = ChangeRecord { id: 1, kind: ElementKind::Node, lat: Some(0.0), lon: Some(0.0), tags };
///
/// assert_eq!(classify_record(ChangeAction::Create, &record), None);
/// assert_eq!(
///     classify_record(ChangeAction::Modify, &record),
///     Some(ChangeClass::UnqualifiedModified),
/// );
/// ```
#[must_use]
pub fn classify_record(action: ChangeAction, record: &ChangeRecord) -> Option<ChangeClass> {
    let tracked = is_domain_tagged(&record.tags);
    match action {
        ChangeAction::Create => tracked.then_some(ChangeClass::Created),
        ChangeAction::Modify if tracked => Some(ChangeClass::Modified),
        ChangeAction::Modify => Some(ChangeClass::UnqualifiedModified),
        ChangeAction::Delete => Some(ChangeClass::Deleted),
    }
}

/// Domain-filtered view of one replication diff.
///
/// Holds at most one record per [`VenueKey`]: routing a later version of an
/// element replaces whatever an earlier version contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// New, domain-tagged entities.
    pub created: Vec<ChangeRecord>,
    /// Edited, domain-tagged entities.
    pub modified: Vec<ChangeRecord>,
    /// Entities removed upstream.
    pub deleted: Vec<ChangeRecord>,
    /// Edited entities that lost every tracked payment tag.
    pub unqualified_modified: Vec<ChangeRecord>,
    /// Entities skipped because they lacked an id or coordinates.
    pub skipped: usize,
    latest: BTreeMap<VenueKey, (ChangeClass, usize)>,
}

impl ChangeSet {
    /// Route `record` from `action` into its bucket.
    ///
    /// Any earlier record for the same element is discarded first, so the
    /// set reflects the last version in document order. Returns the bucket
    /// chosen, or `None` if the record was dropped.
    pub fn route(&mut self, action: ChangeAction, record: ChangeRecord) -> Option<ChangeClass> {
        let key = record.key();
        let class = classify_record(action, &record);
        if let Some((previous, index)) = self.latest.get(&key).copied() {
            if class == Some(previous) {
                if let Some(slot) = self.bucket_mut(previous).get_mut(index) {
                    *slot = record;
                }
                return class;
            }
            self.forget(key, previous, index);
        }
        let chosen = class?;
        let bucket = self.bucket_mut(chosen);
        let index = bucket.len();
        bucket.push(record);
        self.latest.insert(key, (chosen, index));
        Some(chosen)
    }

    fn bucket_mut(&mut self, class: ChangeClass) -> &mut Vec<ChangeRecord> {
        match class {
            ChangeClass::Created => &mut self.created,
            ChangeClass::Modified => &mut self.modified,
            ChangeClass::Deleted => &mut self.deleted,
            ChangeClass::UnqualifiedModified => &mut self.unqualified_modified,
        }
    }

    fn forget(&mut self, key: VenueKey, class: ChangeClass, index: usize) {
        self.latest.remove(&key);
        let bucket = match class {
            ChangeClass::Created => &mut self.created,
            ChangeClass::Modified => &mut self.modified,
            ChangeClass::Deleted => &mut self.deleted,
            ChangeClass::UnqualifiedModified => &mut self.unqualified_modified,
        };
        if index >= bucket.len() {
            return;
        }
        bucket.remove(index);
        for shifted in bucket.iter().skip(index) {
            if let Some(entry) = self.latest.get_mut(&shifted.key()) {
                entry.1 = entry.1.saturating_sub(1);
            }
        }
    }

    /// Records that should be present after the merge.
    pub fn upserts(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.created.iter().chain(self.modified.iter())
    }

    /// Records that should be absent after the merge.
    pub fn removals(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.deleted.iter().chain(self.unqualified_modified.iter())
    }

    /// Total number of routed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len() + self.modified.len() + self.deleted.len() + self.unqualified_modified.len()
    }

    /// Whether the diff touched nothing of interest.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
