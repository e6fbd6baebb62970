//! Data access and synchronisation logic for the venue sync engine.
//!
//! Responsibilities:
//! - Fetch and decompress minutely replication diffs over HTTP.
//! - Classify osmChange documents into venue change sets.
//! - Persist the replication cursor, the venue cache, and the enrichment
//!   queue, mirroring state to a blob store.
//! - Orchestrate bootstrap and incremental synchronisation runs.
//!
//! Boundaries:
//! - Do not encode domain rules (live in `venue-sync-core`).
//! - Keep blocking I/O short; diffs are streamed to disk rather than memory.
//!
//! Invariants:
//! - The consumed sequence only advances after a sequence's changes are
//!   applied and queued.
//! - No global mutable state.
#![forbid(unsafe_code)]

pub mod blob;
pub mod cache;
pub mod log;
pub mod osc;
pub mod queue;
pub mod replication;
pub mod state;
pub mod sync;

pub use blob::{BlobError, BlobStore, DirectoryBlobStore, MemoryBlobStore};
pub use cache::{ApplyReport, CacheError, StagedCache, VenueCacheStore};
pub use self::log::{SyncLog, SyncLogEntry, SyncLogError};
pub use queue::{DirectoryQueue, EmitOutcome, EnrichmentQueue, QueueError};
pub use state::{ReconcileOutcome, StateError, StateTracker};
pub use sync::{SyncError, SyncOptions, SyncOrchestrator, SyncReport};
