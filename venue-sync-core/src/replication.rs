//! Replication cursor types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position in the upstream replication feed.
///
/// # Examples
/// ```
/// use venue_sync_core::SequenceNumber;
///
/// let sequence = SequenceNumber::new(6_123_456);
/// assert_eq!(sequence.path_fragment(), "006/123/456");
/// assert_eq!(sequence.next(), SequenceNumber::new(6_123_457));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// The cursor of a replica that has never synchronised.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw sequence number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The following sequence.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Three-level path used by the replication feed.
    ///
    /// The value is zero-padded to nine digits and split into `AAA/BBB/CCC`.
    #[must_use]
    pub fn path_fragment(self) -> String {
        let top = self.0 / 1_000_000;
        let middle = (self.0 / 1_000) % 1_000;
        let bottom = self.0 % 1_000;
        format!("{top:03}/{middle:03}/{bottom:03}")
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How far the replication feed has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationState {
    /// Last fully applied sequence.
    pub sequence_number: SequenceNumber,
    /// Upstream timestamp of that sequence.
    pub timestamp: DateTime<Utc>,
}

impl ReplicationState {
    /// Construct a replication state.
    #[must_use]
    pub const fn new(sequence_number: SequenceNumber, timestamp: DateTime<Utc>) -> Self {
        Self {
            sequence_number,
            timestamp,
        }
    }

    /// Pick the more advanced of two optional states.
    ///
    /// Ties keep `local`.
    #[must_use]
    pub fn furthest(local: Option<Self>, remote: Option<Self>) -> Option<Self> {
        match (local, remote) {
            (Some(left), Some(right)) if right.sequence_number > left.sequence_number => {
                Some(right)
            }
            (Some(left), _) => Some(left),
            (None, right) => right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn state(sequence: u64) -> ReplicationState {
        ReplicationState::new(SequenceNumber::new(sequence), DateTime::<Utc>::UNIX_EPOCH)
    }

    #[rstest]
    #[case(0, "000/000/000")]
    #[case(7, "000/000/007")]
    #[case(4_123, "000/004/123")]
    #[case(6_123_456, "006/123/456")]
    #[case(999_999_999, "999/999/999")]
    #[case(1_234_567_890, "1234/567/890")]
    fn formats_path_fragments(#[case] value: u64, #[case] expected: &str) {
        assert_eq!(SequenceNumber::new(value).path_fragment(), expected);
    }

    #[rstest]
    #[case(Some(10), Some(25), Some(25))]
    #[case(Some(30), Some(25), Some(30))]
    #[case(Some(25), Some(25), Some(25))]
    #[case(None, Some(25), Some(25))]
    #[case(Some(10), None, Some(10))]
    #[case(None, None, None)]
    fn furthest_prefers_the_larger_sequence(
        #[case] local: Option<u64>,
        #[case] remote: Option<u64>,
        #[case] expected: Option<u64>,
    ) {
        let chosen = ReplicationState::furthest(local.map(state), remote.map(state));
        assert_eq!(chosen.map(|value| value.sequence_number.get()), expected);
    }

    #[rstest]
    fn serialises_as_plain_fields() {
        let json = serde_json::to_string(&state(12)).expect("serialise state");
        assert_eq!(
            json,
            r#"{"sequence_number":12,"timestamp":"1970-01-01T00:00:00Z"}"#
        );
    }
}
