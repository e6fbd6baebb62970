use std::{
    io::{self, BufReader, Seek, SeekFrom, Write},
    sync::LazyLock,
};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use log::debug;
use regex::Regex;
use tempfile::{Builder, NamedTempFile};
use venue_sync_core::SequenceNumber;

use super::source::ReplicationSource;
use super::util::{state_field, unescape_state_value};
use super::{DiffFile, FetchOptions, ReplicationError};

static SEQUENCE_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"sequenceNumber=(\d+)"));

/// Ask the feed for its newest published sequence.
///
/// # Examples
/// ```no_run
/// # use std::time::Duration;
/// # use venue_sync_data::replication::{
/// #     remote_high_water_mark, HttpReplicationSource, ReplicationError, DEFAULT_BASE_URL,
/// # };
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = HttpReplicationSource::new(DEFAULT_BASE_URL, Duration::from_secs(30))?;
/// let newest = remote_high_water_mark(&source).await?;
/// println!("feed is at {newest}");
/// # Ok(())
/// # }
/// ```
pub async fn remote_high_water_mark<S: ReplicationSource + ?Sized>(
    source: &S,
) -> Result<SequenceNumber, ReplicationError> {
    let body = source
        .fetch_latest_state()
        .await
        .map_err(|source| ReplicationError::StateFetch { source })?;
    parse_high_water_mark(&body, &source.base_url().latest_state())
}

/// Extract `sequenceNumber=<n>` from a feed state body fetched from `url`.
pub fn parse_high_water_mark(body: &str, url: &str) -> Result<SequenceNumber, ReplicationError> {
    let pattern = SEQUENCE_PATTERN
        .as_ref()
        .map_err(|err| ReplicationError::Pattern {
            source: err.clone(),
        })?;
    let digits = pattern
        .captures(body)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| ReplicationError::MissingSequenceNumber {
            url: url.to_owned(),
        })?;
    digits
        .as_str()
        .parse::<u64>()
        .map(SequenceNumber::new)
        .map_err(|source| ReplicationError::InvalidSequenceNumber {
            url: url.to_owned(),
            source,
        })
}

/// Extract the `timestamp=` field from a per-sequence state body.
///
/// A body without the field yields the current time; a field that does not
/// parse is an error.
///
/// # Examples
/// ```
/// # use venue_sync_core::SequenceNumber;
/// # use venue_sync_data::replication::parse_state_timestamp;
/// let body = "sequenceNumber=100\ntimestamp=2024-05-01T12\\:30\\:00Z\n";
/// let timestamp = parse_state_timestamp(body, SequenceNumber::new(100)).unwrap();
/// assert_eq!(timestamp.to_rfc3339(), "2024-05-01T12:30:00+00:00");
/// ```
pub fn parse_state_timestamp(
    body: &str,
    sequence: SequenceNumber,
) -> Result<DateTime<Utc>, ReplicationError> {
    let Some(raw) = state_field(body, "timestamp") else {
        debug!("state for sequence {sequence} has no timestamp; using the current time");
        return Ok(Utc::now());
    };
    let value = unescape_state_value(raw);
    DateTime::parse_from_rfc3339(&value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| ReplicationError::MalformedTimestamp {
            sequence,
            value,
            source,
        })
}

/// Sequences still to be consumed, oldest first, at most `cap` of them.
///
/// # Examples
/// ```
/// # use venue_sync_core::SequenceNumber;
/// # use venue_sync_data::replication::missing_sequences;
/// let pending = missing_sequences(SequenceNumber::new(10), SequenceNumber::new(100), 3);
/// let raw: Vec<u64> = pending.into_iter().map(SequenceNumber::get).collect();
/// assert_eq!(raw, [11, 12, 13]);
/// ```
#[must_use]
pub fn missing_sequences(
    consumed: SequenceNumber,
    high_water_mark: SequenceNumber,
    cap: usize,
) -> Vec<SequenceNumber> {
    (consumed.get().saturating_add(1)..=high_water_mark.get())
        .take(cap)
        .map(SequenceNumber::new)
        .collect()
}

/// Download, decompress, and timestamp the diff for `sequence`.
///
/// The compressed download never outlives this call. The decompressed file is
/// owned by the returned [`DiffFile`]; on any failure every temporary file is
/// removed before the error is returned.
pub async fn fetch_diff<S: ReplicationSource + ?Sized>(
    source: &S,
    sequence: SequenceNumber,
    options: &FetchOptions,
) -> Result<DiffFile, ReplicationError> {
    venue_sync_fs::ensure_dir(&options.work_dir).map_err(|err| ReplicationError::WorkDir {
        source: err,
        path: options.work_dir.clone().into_std_path_buf(),
    })?;
    let mut compressed = scratch_file(options, sequence, ".osc.gz")?;
    let bytes = source
        .download_diff(sequence, compressed.as_file_mut())
        .await
        .map_err(|err| ReplicationError::Download {
            sequence,
            source: err,
        })?;
    debug!("downloaded {bytes} compressed bytes for sequence {sequence}");

    let decompressed = decompress(&mut compressed, options, sequence).map_err(|err| {
        ReplicationError::Decompress {
            sequence,
            source: err,
        }
    })?;
    drop(compressed);

    tokio::time::sleep(options.courtesy_delay).await;

    let state = source
        .fetch_sequence_state(sequence)
        .await
        .map_err(|err| ReplicationError::SequenceStateFetch {
            sequence,
            source: err,
        })?;
    let timestamp = parse_state_timestamp(&state, sequence)?;
    Ok(DiffFile::new(
        sequence,
        timestamp,
        decompressed.into_temp_path(),
    ))
}

fn scratch_file(
    options: &FetchOptions,
    sequence: SequenceNumber,
    suffix: &str,
) -> Result<NamedTempFile, ReplicationError> {
    Builder::new()
        .prefix(&format!("diff-{sequence}-"))
        .suffix(suffix)
        .tempfile_in(&options.work_dir)
        .map_err(|source| ReplicationError::WorkDir {
            source,
            path: options.work_dir.clone().into_std_path_buf(),
        })
}

fn decompress(
    compressed: &mut NamedTempFile,
    options: &FetchOptions,
    sequence: SequenceNumber,
) -> io::Result<NamedTempFile> {
    let file = compressed.as_file_mut();
    file.flush()?;
    file.seek(SeekFrom::Start(0))?;
    let mut decoder = GzDecoder::new(BufReader::new(&*file));
    let mut output = Builder::new()
        .prefix(&format!("diff-{sequence}-"))
        .suffix(".osc")
        .tempfile_in(&options.work_dir)?;
    io::copy(&mut decoder, output.as_file_mut())?;
    output.as_file_mut().flush()?;
    Ok(output)
}
