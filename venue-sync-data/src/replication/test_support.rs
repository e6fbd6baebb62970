//! Shared fixtures for replication tests.
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    future::Future,
    io::Write,
};

use async_trait::async_trait;
use flate2::{Compression, write::GzEncoder};
use venue_sync_core::SequenceNumber;

use super::{BaseUrl, ReplicationSource, TransportError};

/// Drive a future to completion on a single-threaded runtime.
///
/// # Panics
/// Panics if the runtime cannot be constructed.
pub fn block_on_for_tests<F: Future>(future: F) -> F::Output {
    match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime.block_on(future),
        Err(err) => panic!("failed to build test runtime: {err}"),
    }
}

/// Gzip `document` the way the feed publishes diffs.
///
/// # Panics
/// Panics if compressing into memory fails.
pub fn gzip(document: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    if let Err(err) = encoder.write_all(document.as_bytes()) {
        panic!("failed to compress fixture: {err}");
    }
    match encoder.finish() {
        Ok(bytes) => bytes,
        Err(err) => panic!("failed to finish fixture compression: {err}"),
    }
}

/// A `state.txt` body naming `sequence` as the newest published diff.
pub fn feed_state(sequence: u64) -> String {
    format!(
        "#Thu May 02 08:00:00 UTC 2024\nsequenceNumber={sequence}\ntimestamp=2024-05-02T08\\:00\\:00Z\n"
    )
}

/// Stub [`ReplicationSource`] backed by in-memory diffs.
///
/// Diffs are registered as plain osmChange XML and compressed on the way
/// out. Every download is recorded so tests can assert ordering.
#[derive(Debug)]
pub struct StubReplicationSource {
    base_url: BaseUrl,
    latest_state: Option<String>,
    diffs: BTreeMap<SequenceNumber, Vec<u8>>,
    states: BTreeMap<SequenceNumber, String>,
    failing: BTreeSet<SequenceNumber>,
    downloads: RefCell<Vec<SequenceNumber>>,
}

impl StubReplicationSource {
    /// A feed whose newest sequence is `high_water_mark`.
    pub fn new(high_water_mark: u64) -> Self {
        Self {
            base_url: BaseUrl::from("https://replication.example.org/minute"),
            latest_state: Some(feed_state(high_water_mark)),
            diffs: BTreeMap::new(),
            states: BTreeMap::new(),
            failing: BTreeSet::new(),
            downloads: RefCell::new(Vec::new()),
        }
    }

    /// A feed whose global state cannot be fetched.
    pub fn unreachable() -> Self {
        Self {
            latest_state: None,
            ..Self::new(0)
        }
    }

    /// Replace the global state body.
    #[must_use]
    pub fn with_latest_state(mut self, body: impl Into<String>) -> Self {
        self.latest_state = Some(body.into());
        self
    }

    /// Register the osmChange document for `sequence`.
    #[must_use]
    pub fn with_diff(mut self, sequence: u64, document: &str) -> Self {
        self.diffs
            .insert(SequenceNumber::new(sequence), gzip(document));
        self
    }

    /// Register raw bytes served as the compressed diff for `sequence`.
    #[must_use]
    pub fn with_raw_diff(mut self, sequence: u64, bytes: Vec<u8>) -> Self {
        self.diffs.insert(SequenceNumber::new(sequence), bytes);
        self
    }

    /// Register the per-sequence state body for `sequence`.
    #[must_use]
    pub fn with_sequence_state(mut self, sequence: u64, body: impl Into<String>) -> Self {
        self.states.insert(SequenceNumber::new(sequence), body.into());
        self
    }

    /// Make downloads of `sequence` fail with a network error.
    #[must_use]
    pub fn failing_at(mut self, sequence: u64) -> Self {
        self.failing.insert(SequenceNumber::new(sequence));
        self
    }

    /// Sequences downloaded so far, in request order.
    pub fn downloads(&self) -> Vec<SequenceNumber> {
        self.downloads.borrow().clone()
    }

    fn unavailable(url: String) -> TransportError {
        TransportError::Http {
            url,
            status: 404,
            message: "not found".to_owned(),
        }
    }
}

#[async_trait(?Send)]
impl ReplicationSource for StubReplicationSource {
    fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    async fn fetch_latest_state(&self) -> Result<String, TransportError> {
        self.latest_state
            .clone()
            .ok_or_else(|| Self::unavailable(self.base_url.latest_state()))
    }

    async fn fetch_sequence_state(
        &self,
        sequence: SequenceNumber,
    ) -> Result<String, TransportError> {
        Ok(self.states.get(&sequence).cloned().unwrap_or_else(|| {
            format!(
                "sequenceNumber={sequence}\ntimestamp=2024-05-02T08\\:00\\:00Z\n"
            )
        }))
    }

    async fn download_diff(
        &self,
        sequence: SequenceNumber,
        sink: &mut dyn Write,
    ) -> Result<u64, TransportError> {
        self.downloads.borrow_mut().push(sequence);
        let url = self.base_url.diff(sequence);
        if self.failing.contains(&sequence) {
            return Err(TransportError::Network {
                url,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "request timed out"),
            });
        }
        let bytes = self
            .diffs
            .get(&sequence)
            .ok_or_else(|| Self::unavailable(url.clone()))?;
        sink.write_all(bytes)
            .map_err(|source| TransportError::Sink { url, source })?;
        Ok(u64::try_from(bytes.len()).unwrap_or(u64::MAX))
    }
}
