//! Shared helpers used across replication operations and sources.

use super::BaseUrl;
use super::source::DEFAULT_BASE_URL;

/// Trim trailing slashes and fall back to the public minutely feed.
pub(crate) fn sanitise_base_url(url: impl Into<String>) -> BaseUrl {
    let raw = url.into();
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        BaseUrl::from(DEFAULT_BASE_URL)
    } else {
        BaseUrl::new(trimmed.to_owned())
    }
}

/// Undo the `\:` escaping the feed applies to values in `state.txt`.
pub(crate) fn unescape_state_value(raw: &str) -> String {
    raw.replace("\\:", ":")
}

/// Find `key=value` in a `state.txt` body and return the raw value.
pub(crate) fn state_field<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .find_map(|line| {
            let (name, value) = line.split_once('=')?;
            (name.trim() == key).then(|| value.trim())
        })
}
