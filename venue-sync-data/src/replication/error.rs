//! Error types produced while following the replication feed.

use std::{io, num::ParseIntError, path::PathBuf};

use thiserror::Error;
use venue_sync_core::SequenceNumber;

/// Errors produced while locating, downloading, or unpacking a diff.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReplicationError {
    /// The global feed state could not be fetched.
    #[error("failed to fetch replication state: {source}")]
    StateFetch { source: TransportError },
    /// The feed state did not name a sequence number.
    #[error("replication state from {url} did not contain a sequence number")]
    MissingSequenceNumber { url: String },
    /// The sequence number in the feed state did not fit a `u64`.
    #[error("replication state from {url} carried an invalid sequence number: {source}")]
    InvalidSequenceNumber { url: String, source: ParseIntError },
    /// The sequence-number pattern failed to compile.
    #[error("sequence number pattern is invalid: {source}")]
    Pattern { source: regex::Error },
    /// Preparing the scratch directory failed.
    #[error("failed to prepare work directory {path:?}: {source}")]
    WorkDir { source: io::Error, path: PathBuf },
    /// The compressed diff could not be downloaded.
    #[error("failed to download diff for sequence {sequence}: {source}")]
    Download {
        sequence: SequenceNumber,
        source: TransportError,
    },
    /// The downloaded diff was not valid gzip or could not be written.
    #[error("failed to decompress diff for sequence {sequence}: {source}")]
    Decompress {
        sequence: SequenceNumber,
        source: io::Error,
    },
    /// The per-sequence state could not be fetched.
    #[error("failed to fetch state for sequence {sequence}: {source}")]
    SequenceStateFetch {
        sequence: SequenceNumber,
        source: TransportError,
    },
    /// The per-sequence state carried a timestamp that is not RFC 3339.
    #[error("state for sequence {sequence} has malformed timestamp {value:?}: {source}")]
    MalformedTimestamp {
        sequence: SequenceNumber,
        value: String,
        source: chrono::ParseError,
    },
}

/// Transport-level errors encountered while issuing HTTP requests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// Error reported by the client builder.
        source: reqwest::Error,
    },
    /// The server returned an HTTP error status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Fully qualified request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Short error description supplied by the server.
        message: String,
    },
    /// The request failed due to an I/O error.
    #[error("network error contacting {url}: {source}")]
    Network {
        /// Fully qualified request URL.
        url: String,
        /// I/O error reported by the transport.
        source: io::Error,
    },
    /// The response body could not be written to the caller's sink.
    #[error("failed to store response from {url}: {source}")]
    Sink {
        /// Fully qualified request URL.
        url: String,
        /// I/O error reported by the sink.
        source: io::Error,
    },
}
