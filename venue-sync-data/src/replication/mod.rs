//! Facilities for following the upstream minutely replication feed.
//!
//! The feed publishes a global `state.txt` naming the newest sequence and,
//! per sequence, a gzip-compressed osmChange document plus a companion
//! `state.txt` carrying its timestamp.
#![forbid(unsafe_code)]

mod error;
mod ops;
mod source;
mod types;
mod util;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{ReplicationError, TransportError};
pub use ops::{
    fetch_diff, missing_sequences, parse_high_water_mark, parse_state_timestamp,
    remote_high_water_mark,
};
pub use source::{
    DEFAULT_BASE_URL, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, HttpReplicationSource,
    ReplicationSource,
};
pub use types::{BaseUrl, DiffFile, FetchOptions};
