//! SQLite audit trail of applied sequences.

use std::{
    error::Error as StdError,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use venue_sync_core::SequenceNumber;

use crate::sync::AppliedSequence;

/// Errors raised by [`SyncLog`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncLogError {
    /// Opening or migrating the database failed.
    #[error("failed to initialise sync log at {path:?}: {source}")]
    Initialise {
        source: rusqlite::Error,
        path: PathBuf,
    },
    /// Inserting an entry failed.
    #[error("failed to record applied sequence: {source}")]
    Record { source: rusqlite::Error },
    /// Reading entries back failed.
    #[error("failed to query sync log: {source}")]
    Query { source: rusqlite::Error },
    /// A value could not be converted for storage or after loading.
    #[error("failed to convert sync log value ({what}): {source}")]
    Value {
        /// Description of the value that failed to convert.
        what: String,
        /// Underlying conversion error.
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// One row of the sync log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLogEntry {
    /// Sequence applied.
    pub sequence: SequenceNumber,
    /// Timestamp published upstream for the sequence.
    pub upstream_timestamp: DateTime<Utc>,
    /// Venues created.
    pub created: u64,
    /// Venues modified.
    pub modified: u64,
    /// Venues removed.
    pub removed: u64,
    /// Whether an enrichment batch was queued.
    pub emitted: bool,
    /// Whether the cache file was rewritten.
    pub cache_written: bool,
    /// Wall-clock time the sequence was applied.
    pub applied_at: DateTime<Utc>,
}

/// Persisted audit trail of applied sequences.
#[derive(Debug)]
pub struct SyncLog {
    connection: Connection,
    location: PathBuf,
}

impl SyncLog {
    /// Open (or create) the log at the supplied path.
    pub fn initialise(path: &Path) -> Result<Self, SyncLogError> {
        let connection = Connection::open(path).map_err(|source| SyncLogError::Initialise {
            source,
            path: path.to_path_buf(),
        })?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS applied_sequences (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sequence INTEGER NOT NULL,
                    upstream_timestamp TEXT NOT NULL,
                    created INTEGER NOT NULL,
                    modified INTEGER NOT NULL,
                    removed INTEGER NOT NULL,
                    emitted INTEGER NOT NULL,
                    cache_written INTEGER NOT NULL,
                    applied_at TEXT NOT NULL
                )",
                [],
            )
            .map_err(|source| SyncLogError::Initialise {
                source,
                path: path.to_path_buf(),
            })?;
        Ok(Self {
            connection,
            location: path.to_path_buf(),
        })
    }

    /// Record a successfully applied sequence.
    pub fn record(&self, applied: &AppliedSequence) -> Result<(), SyncLogError> {
        let sequence = to_sql_integer("sequence", applied.sequence.get())?;
        let created = to_sql_integer("created count", applied.created_count)?;
        let modified = to_sql_integer("modified count", applied.modified_count)?;
        let removed = to_sql_integer("removed count", applied.removed_count)?;
        self.connection
            .execute(
                "INSERT INTO applied_sequences (
                    sequence,
                    upstream_timestamp,
                    created,
                    modified,
                    removed,
                    emitted,
                    cache_written,
                    applied_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    sequence,
                    applied.timestamp.to_rfc3339(),
                    created,
                    modified,
                    removed,
                    applied.emitted(),
                    applied.cache_written,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|source| SyncLogError::Record { source })?;
        Ok(())
    }

    /// Most recently recorded entry, if any.
    pub fn latest(&self) -> Result<Option<SyncLogEntry>, SyncLogError> {
        let row = self
            .connection
            .query_row(
                "SELECT sequence, upstream_timestamp, created, modified, removed,
                        emitted, cache_written, applied_at
                 FROM applied_sequences
                 ORDER BY id DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok(RawEntry {
                        sequence: row.get(0)?,
                        upstream_timestamp: row.get(1)?,
                        created: row.get(2)?,
                        modified: row.get(3)?,
                        removed: row.get(4)?,
                        emitted: row.get(5)?,
                        cache_written: row.get(6)?,
                        applied_at: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(|source| SyncLogError::Query { source })?;
        row.map(RawEntry::into_entry).transpose()
    }

    /// Number of recorded entries.
    pub fn len(&self) -> Result<u64, SyncLogError> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM applied_sequences", [], |row| {
                row.get(0)
            })
            .map_err(|source| SyncLogError::Query { source })?;
        from_sql_integer("entry count", count)
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> Result<bool, SyncLogError> {
        self.len().map(|count| count == 0)
    }

    /// Location of the underlying SQLite database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.location
    }
}

struct RawEntry {
    sequence: i64,
    upstream_timestamp: String,
    created: i64,
    modified: i64,
    removed: i64,
    emitted: bool,
    cache_written: bool,
    applied_at: String,
}

impl RawEntry {
    fn into_entry(self) -> Result<SyncLogEntry, SyncLogError> {
        Ok(SyncLogEntry {
            sequence: SequenceNumber::new(from_sql_integer("sequence", self.sequence)?),
            upstream_timestamp: parse_timestamp("upstream timestamp", &self.upstream_timestamp)?,
            created: from_sql_integer("created count", self.created)?,
            modified: from_sql_integer("modified count", self.modified)?,
            removed: from_sql_integer("removed count", self.removed)?,
            emitted: self.emitted,
            cache_written: self.cache_written,
            applied_at: parse_timestamp("applied at", &self.applied_at)?,
        })
    }
}

fn to_sql_integer<T>(what: &str, value: T) -> Result<i64, SyncLogError>
where
    i64: TryFrom<T>,
    <i64 as TryFrom<T>>::Error: StdError + Send + Sync + 'static,
{
    i64::try_from(value).map_err(|err| SyncLogError::Value {
        what: what.to_owned(),
        source: Box::new(err),
    })
}

fn from_sql_integer(what: &str, value: i64) -> Result<u64, SyncLogError> {
    u64::try_from(value).map_err(|err| SyncLogError::Value {
        what: what.to_owned(),
        source: Box::new(err),
    })
}

fn parse_timestamp(what: &str, raw: &str) -> Result<DateTime<Utc>, SyncLogError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| SyncLogError::Value {
            what: what.to_owned(),
            source: Box::new(err),
        })
}
