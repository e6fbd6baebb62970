//! Tag utilities shared by the classifier and the snapshot.
//!
//! Provides helpers to:
//! - detect whether an element advertises a tracked payment method; and
//! - strip control characters from upstream tag text.
use std::collections::BTreeMap;

/// OpenStreetMap-style key/value tags.
///
/// Ordered so that serialised snapshots are byte-stable.
pub type Tags = BTreeMap<String, String>;

/// Boolean tag keys that mark an element as accepting bitcoin.
///
/// An element is tracked when any of these keys carries the value `yes`.
pub const DOMAIN_TAG_KEYS: [&str; 5] = [
    "payment:bitcoin",
    "currency:XBT",
    "payment:lightning",
    "payment:onchain",
    "payment:lightning_contactless",
];

const DOMAIN_TAG_VALUE: &str = "yes";

/// Returns true when any tracked payment key is set to `yes`.
///
/// # Examples
/// ```
/// use venue_sync_core::{Tags, is_domain_tagged};
///
/// let mut tags = Tags::new();
/// tags.insert("payment:bitcoin".into(), "yes".into());
/// assert!(is_domain_tagged(&tags));
///
/// tags.insert("payment:bitcoin".into(), "no".into());
/// assert!(!is_domain_tagged(&tags));
/// ```
#[must_use]
pub fn is_domain_tagged(tags: &Tags) -> bool {
    DOMAIN_TAG_KEYS
        .iter()
        .any(|key| tags.get(*key).is_some_and(|value| value == DOMAIN_TAG_VALUE))
}

/// Strip C0 and C1 control characters, then trim surrounding whitespace.
///
/// # Examples
/// ```
/// use venue_sync_core::sanitise_tag_text;
///
/// assert_eq!(sanitise_tag_text(" Cafe\u{0007}Sats\u{0085} "), "CafeSats");
/// ```
#[must_use]
pub fn sanitise_tag_text(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|ch| !is_control(*ch)).collect();
    stripped.trim().to_owned()
}

fn is_control(ch: char) -> bool {
    matches!(ch, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tags_of(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[rstest]
    #[case("payment:bitcoin")]
    #[case("currency:XBT")]
    #[case("payment:lightning")]
    #[case("payment:onchain")]
    #[case("payment:lightning_contactless")]
    fn each_tracked_key_qualifies(#[case] key: &str) {
        assert!(is_domain_tagged(&tags_of(&[(key, "yes")])));
    }

    #[rstest]
    #[case(&[("payment:bitcoin", "no")])]
    #[case(&[("payment:bitcoin", "Yes")])]
    #[case(&[("payment:cash", "yes")])]
    #[case(&[("name", "Corner Shop")])]
    #[case(&[])]
    fn other_tags_do_not_qualify(#[case] pairs: &[(&str, &str)]) {
        assert!(!is_domain_tagged(&tags_of(pairs)));
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("  padded\t", "padded")]
    #[case("line\nbreak", "linebreak")]
    #[case("\u{0000}nul", "nul")]
    #[case("del\u{007F}", "del")]
    #[case("c1\u{009B}range", "c1range")]
    #[case("k\u{00E9}k", "k\u{00E9}k")]
    #[case("\u{0085}", "")]
    fn sanitises_control_characters(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitise_tag_text(raw), expected);
    }
}
