//! Key-value blob mirror used for disaster recovery.
//!
//! The mirror holds a copy of the replication state and the venue cache so a
//! fresh host can resume where the last one stopped. Local disk stays
//! authoritative; the mirror is written best-effort.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    io,
};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Errors raised by [`BlobStore`] implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BlobError {
    /// The blob name is empty or escapes the store.
    #[error("invalid blob name {name:?}")]
    InvalidName { name: String },
    /// Reading or writing the blob failed.
    #[error("blob {name:?} could not be accessed: {source}")]
    Io { name: String, source: io::Error },
    /// The store refused the request.
    #[error("blob store unavailable while accessing {name:?}")]
    Unavailable { name: String },
}

/// Durable storage addressed by logical asset name.
#[async_trait(?Send)]
pub trait BlobStore {
    /// Fetch a blob, returning `None` if it has never been written.
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, BlobError>;
    /// Replace a blob.
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), BlobError>;
}

fn validate_name(name: &str) -> Result<(), BlobError> {
    let invalid = name.trim().is_empty()
        || name.starts_with('/')
        || name.contains("..")
        || name.contains('\\');
    if invalid {
        return Err(BlobError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Blob store backed by a local directory, typically a mounted volume.
///
/// Writes are atomic per blob.
#[derive(Debug, Clone)]
pub struct DirectoryBlobStore {
    root: Utf8PathBuf,
}

impl DirectoryBlobStore {
    /// Use `root` as the store, creating it if necessary.
    pub fn open(root: impl Into<Utf8PathBuf>) -> io::Result<Self> {
        let root = root.into();
        venue_sync_fs::ensure_dir(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the blobs.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<Utf8PathBuf, BlobError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait(?Send)]
impl BlobStore for DirectoryBlobStore {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.path_for(name)?;
        venue_sync_fs::read_if_exists(&path).map_err(|source| BlobError::Io {
            name: name.to_owned(),
            source,
        })
    }

    async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.path_for(name)?;
        venue_sync_fs::write_atomic(&path, bytes).map_err(|source| BlobError::Io {
            name: name.to_owned(),
            source,
        })
    }
}

/// In-memory blob store.
///
/// Useful for tests and for running without a mirror configured. Call
/// [`MemoryBlobStore::set_available`] to simulate an outage.
#[derive(Debug)]
pub struct MemoryBlobStore {
    blobs: RefCell<BTreeMap<String, Vec<u8>>>,
    available: Cell<bool>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self {
            blobs: RefCell::new(BTreeMap::new()),
            available: Cell::new(true),
        }
    }
}

impl MemoryBlobStore {
    /// An empty, available store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle whether requests succeed.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Seed a blob without going through the async interface.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.blobs.borrow_mut().insert(name.into(), bytes.into());
    }

    /// Current contents of a blob.
    #[must_use]
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.borrow().get(name).cloned()
    }

    fn ensure_available(&self, name: &str) -> Result<(), BlobError> {
        if self.available.get() {
            Ok(())
        } else {
            Err(BlobError::Unavailable {
                name: name.to_owned(),
            })
        }
    }
}

#[async_trait(?Send)]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, BlobError> {
        validate_name(name)?;
        self.ensure_available(name)?;
        Ok(self.contents(name))
    }

    async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), BlobError> {
        validate_name(name)?;
        self.ensure_available(name)?;
        self.insert(name, bytes);
        Ok(())
    }
}
