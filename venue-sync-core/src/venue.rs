use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tags::Tags;

/// OpenStreetMap element type carrying a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// A single coordinate.
    Node,
    /// An ordered list of nodes.
    Way,
    /// A group of members.
    Relation,
}

impl ElementKind {
    /// Map an osmChange element name to its kind.
    ///
    /// # Examples
    /// ```
    /// use venue_sync_core::ElementKind;
    ///
    /// assert_eq!(ElementKind::from_element_name(b"way"), Some(ElementKind::Way));
    /// assert_eq!(ElementKind::from_element_name(b"tag"), None);
    /// ```
    #[must_use]
    pub fn from_element_name(name: &[u8]) -> Option<Self> {
        match name {
            b"node" => Some(Self::Node),
            b"way" => Some(Self::Way),
            b"relation" => Some(Self::Relation),
            _ => None,
        }
    }

    /// Lowercase name used on the wire and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a venue in the snapshot.
///
/// Upstream identifiers are only unique per element kind, so the kind is part
/// of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VenueKey {
    /// Element kind.
    pub kind: ElementKind,
    /// Upstream identifier.
    pub id: i64,
}

impl VenueKey {
    /// Construct a key from its parts.
    #[must_use]
    pub const fn new(kind: ElementKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for VenueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A venue advertising a tracked payment method.
///
/// Coordinates are WGS84 degrees. Tags mirror OpenStreetMap's free-form
/// key/value structure after sanitisation.
///
/// # Examples
/// ```
/// use venue_sync_core::{ElementKind, Tags, VenueKey, VenueRecord};
///
/// let mut tags = Tags::new();
/// tags.insert("name".into(), "CafeSats".into());
/// let venue = VenueRecord::new(ElementKind::Node, 42, Some(10.0), Some(20.0), tags);
///
/// assert_eq!(venue.key(), VenueKey::new(ElementKind::Node, 42));
/// assert_eq!(venue.tags.get("name").map(String::as_str), Some("CafeSats"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    /// Upstream identifier.
    pub id: i64,
    /// Upstream element kind.
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Latitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    /// Longitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Sanitised tags.
    #[serde(default)]
    pub tags: Tags,
}

impl VenueRecord {
    /// Construct a venue record.
    #[must_use]
    pub const fn new(
        kind: ElementKind,
        id: i64,
        lat: Option<f64>,
        lon: Option<f64>,
        tags: Tags,
    ) -> Self {
        Self {
            id,
            kind,
            lat,
            lon,
            tags,
        }
    }

    /// Identity of this record in the snapshot.
    #[must_use]
    pub const fn key(&self) -> VenueKey {
        VenueKey::new(self.kind, self.id)
    }

    /// Whether coordinates and tags match `other`.
    ///
    /// Identity is not compared; callers look records up by key first.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.lat == other.lat && self.lon == other.lon && self.tags == other.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn serialises_kind_as_type_field() {
        let venue = VenueRecord::new(ElementKind::Way, 7, None, None, Tags::new());
        let json = serde_json::to_string(&venue).expect("serialise venue");
        assert_eq!(json, r#"{"id":7,"type":"way","tags":{}}"#);
    }

    #[rstest]
    fn keys_order_by_kind_then_id() {
        let mut keys = vec![
            VenueKey::new(ElementKind::Way, 1),
            VenueKey::new(ElementKind::Node, 9),
            VenueKey::new(ElementKind::Node, 2),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                VenueKey::new(ElementKind::Node, 2),
                VenueKey::new(ElementKind::Node, 9),
                VenueKey::new(ElementKind::Way, 1),
            ]
        );
    }

    #[rstest]
    fn content_comparison_ignores_nothing_but_identity() {
        let base = VenueRecord::new(ElementKind::Node, 1, Some(1.0), Some(2.0), Tags::new());
        let mut moved = base.clone();
        moved.lat = Some(1.5);
        let mut relabelled = base.clone();
        relabelled.id = 2;
        assert!(!base.same_content(&moved));
        assert!(base.same_content(&relabelled));
    }

    #[rstest]
    fn displays_key_as_kind_and_id() {
        assert_eq!(VenueKey::new(ElementKind::Relation, 5).to_string(), "relation/5");
    }
}
