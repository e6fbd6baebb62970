//! Domain wrappers for the replication endpoint and downloaded diffs.

use std::{fmt, ops::Deref, path::Path, time::Duration};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use log::warn;
use tempfile::TempPath;
use venue_sync_core::SequenceNumber;

/// Base URL of a replication feed, without a trailing slash.
///
/// # Examples
/// ```
/// # use venue_sync_data::replication::BaseUrl;
/// let url = BaseUrl::new("https://planet.openstreetmap.org/replication/minute");
/// assert_eq!(
///     url.resource("state.txt"),
///     "https://planet.openstreetmap.org/replication/minute/state.txt",
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Construct a new [`BaseUrl`] from an owned or borrowed string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Consume the wrapper and return the inner [`String`].
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Absolute URL of a resource below the feed root.
    #[must_use]
    pub fn resource(&self, relative: &str) -> String {
        format!("{}/{}", self.0, relative.trim_start_matches('/'))
    }

    /// URL of the global feed state.
    #[must_use]
    pub fn latest_state(&self) -> String {
        self.resource("state.txt")
    }

    /// URL of the compressed diff for `sequence`.
    #[must_use]
    pub fn diff(&self, sequence: SequenceNumber) -> String {
        self.resource(&format!("{}.osc.gz", sequence.path_fragment()))
    }

    /// URL of the state published alongside the diff for `sequence`.
    #[must_use]
    pub fn sequence_state(&self, sequence: SequenceNumber) -> String {
        self.resource(&format!("{}.state.txt", sequence.path_fragment()))
    }
}

impl From<&str> for BaseUrl {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for BaseUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for BaseUrl {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decompressed diff on local disk.
///
/// The file is removed when the value is dropped. Call [`DiffFile::cleanup`]
/// to remove it eagerly and log any failure.
#[derive(Debug)]
pub struct DiffFile {
    sequence: SequenceNumber,
    timestamp: DateTime<Utc>,
    path: TempPath,
}

impl DiffFile {
    pub(crate) const fn new(
        sequence: SequenceNumber,
        timestamp: DateTime<Utc>,
        path: TempPath,
    ) -> Self {
        Self {
            sequence,
            timestamp,
            path,
        }
    }

    /// Sequence the diff belongs to.
    #[must_use]
    pub const fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Upstream timestamp published for the sequence.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Location of the decompressed osmChange document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now, logging rather than propagating failures.
    pub fn cleanup(self) {
        let location = self.path.to_path_buf();
        if let Err(err) = self.path.close() {
            warn!(
                "failed to remove diff for sequence {} at {}: {err}",
                self.sequence,
                location.display()
            );
        }
    }
}

/// Knobs for [`fetch_diff`](super::fetch_diff).
///
/// # Examples
/// ```
/// # use std::time::Duration;
/// # use venue_sync_data::replication::FetchOptions;
/// let options = FetchOptions::new("/var/lib/venue-sync/work")
///     .with_courtesy_delay(Duration::from_millis(250));
/// assert_eq!(options.courtesy_delay, Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Directory receiving temporary diff files.
    pub work_dir: Utf8PathBuf,
    /// Pause between downloading a diff and fetching its state.
    pub courtesy_delay: Duration,
}

impl FetchOptions {
    /// Default pause between the diff and state requests.
    pub const DEFAULT_COURTESY_DELAY: Duration = Duration::from_secs(1);

    /// Options writing into `work_dir` with the default courtesy delay.
    pub fn new(work_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            courtesy_delay: Self::DEFAULT_COURTESY_DELAY,
        }
    }

    /// Override the courtesy delay.
    #[must_use]
    pub const fn with_courtesy_delay(mut self, delay: Duration) -> Self {
        self.courtesy_delay = delay;
        self
    }
}
