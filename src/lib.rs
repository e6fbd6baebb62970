//! Facade crate for the venue synchronisation engine.
//!
//! This crate re-exports the core domain types and the synchronisation
//! components that keep a cache of bitcoin-accepting venues in step with the
//! OpenStreetMap minutely replication feed.

#![forbid(unsafe_code)]

pub use venue_sync_core::{
    ChangeAction, ChangeRecord, ChangeSet, ElementKind, EnrichmentBatch, MergeOutcome,
    ReplicationState, SequenceNumber, Tags, VenueKey, VenueRecord, VenueSnapshot,
    is_domain_tagged,
};

pub use venue_sync_data::replication::{HttpReplicationSource, ReplicationSource};
pub use venue_sync_data::{
    BlobStore, DirectoryBlobStore, DirectoryQueue, EnrichmentQueue, StateTracker, SyncError,
    SyncLog, SyncOptions, SyncOrchestrator, SyncReport, VenueCacheStore,
};
