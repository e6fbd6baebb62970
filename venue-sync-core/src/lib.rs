//! Core domain types for the venue synchronisation engine.
//!
//! Responsibilities:
//! - Model venues, their identities, and their OpenStreetMap tags.
//! - Encode the domain rules that decide which upstream entities are tracked.
//! - Merge classified change sets into an identity-keyed snapshot.
//!
//! Boundaries:
//! - No I/O. Fetching, parsing, and persistence live in `venue-sync-data`.
//!
//! Invariants:
//! - Snapshots reflect only current truth: upserts and tombstones, never an
//!   append-only history.
//! - Replication cursors only move forward.
#![forbid(unsafe_code)]

pub mod batch;
pub mod change;
pub mod replication;
pub mod snapshot;
pub mod tags;
pub mod venue;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use batch::EnrichmentBatch;
pub use change::{ChangeAction, ChangeClass, ChangeRecord, ChangeSet, classify_record};
pub use replication::{ReplicationState, SequenceNumber};
pub use snapshot::{MergeOutcome, VenueSnapshot};
pub use tags::{DOMAIN_TAG_KEYS, Tags, is_domain_tagged, sanitise_tag_text};
pub use venue::{ElementKind, VenueKey, VenueRecord};
