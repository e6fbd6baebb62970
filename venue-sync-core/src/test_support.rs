//! Record builders shared by unit and behaviour tests.

use crate::{ChangeRecord, ElementKind, Tags, VenueRecord};

/// Build tags from borrowed pairs.
pub fn tags_from(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

/// A node change carrying exactly the supplied tags.
pub fn tagged_node(id: i64, lat: f64, lon: f64, pairs: &[(&str, &str)]) -> ChangeRecord {
    ChangeRecord {
        id,
        kind: ElementKind::Node,
        lat: Some(lat),
        lon: Some(lon),
        tags: tags_from(pairs),
    }
}

/// A node change tagged `payment:bitcoin=yes`.
pub fn bitcoin_node(id: i64, lat: f64, lon: f64) -> ChangeRecord {
    tagged_node(id, lat, lon, &[("payment:bitcoin", "yes")])
}

/// A deletion marker for a node.
pub fn deleted_node(id: i64) -> ChangeRecord {
    ChangeRecord {
        id,
        kind: ElementKind::Node,
        lat: None,
        lon: None,
        tags: Tags::new(),
    }
}

/// A stored venue for a bitcoin-accepting node.
pub fn bitcoin_venue(id: i64, lat: f64, lon: f64) -> VenueRecord {
    bitcoin_node(id, lat, lon).to_venue()
}
