use super::{ClassifyError, classify, classify_file};
use rstest::{fixture, rstest};
use std::{io::Write, path::PathBuf};
use tempfile::NamedTempFile;
use venue_sync_core::test_support::bitcoin_venue;
use venue_sync_core::{ElementKind, VenueKey, VenueSnapshot};

fn document(body: &str) -> String {
    format!(r#"<?xml version="1.0" encoding="UTF-8"?><osmChange version="0.6" generator="test">{body}</osmChange>"#)
}

#[fixture]
fn mixed_diff() -> String {
    document(
        r#"
        <create>
          <node id="42" version="1" lat="10.0" lon="20.0">
            <tag k="payment:bitcoin" v="yes"/>
            <tag k="name" v="CafeSats"/>
          </node>
          <node id="43" version="1" lat="11.0" lon="21.0">
            <tag k="amenity" v="bench"/>
          </node>
        </create>
        <modify>
          <node id="1" version="3" lat="1.0" lon="1.0">
            <tag k="currency:XBT" v="yes"/>
          </node>
          <node id="2" version="4" lat="2.0" lon="2.0">
            <tag k="payment:bitcoin" v="no"/>
          </node>
          <way id="9" version="2">
            <nd ref="1"/>
            <nd ref="2"/>
            <tag k="payment:lightning" v="yes"/>
          </way>
        </modify>
        <delete>
          <node id="3" version="5"/>
          <way id="4" version="2"/>
        </delete>
        <create>
          <node id="44" lat="12.0" lon="22.0"><tag k="payment:onchain" v="yes"/></node>
        </create>
        "#,
    )
}

#[rstest]
fn routes_entities_by_section_and_domain_tags(mixed_diff: String) {
    let changes = classify(mixed_diff.as_bytes()).expect("diff should parse");

    let created: Vec<i64> = changes.created.iter().map(|record| record.id).collect();
    assert_eq!(created, [42, 44], "repeated sections are all read");
    let modified: Vec<i64> = changes.modified.iter().map(|record| record.id).collect();
    assert_eq!(modified, [1]);
    let unqualified: Vec<i64> = changes
        .unqualified_modified
        .iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(unqualified, [2]);
    let deleted: Vec<VenueKey> = changes.deleted.iter().map(|record| record.key()).collect();
    assert_eq!(
        deleted,
        [
            VenueKey::new(ElementKind::Node, 3),
            VenueKey::new(ElementKind::Way, 4)
        ]
    );
    assert_eq!(changes.skipped, 1, "the way has no coordinates");
}

#[rstest]
fn keeps_coordinates_and_tags(mixed_diff: String) {
    let changes = classify(mixed_diff.as_bytes()).expect("diff should parse");
    let cafe = changes.created.first().expect("created record");
    assert_eq!(cafe.lat, Some(10.0));
    assert_eq!(cafe.lon, Some(20.0));
    assert_eq!(cafe.tags.get("name").map(String::as_str), Some("CafeSats"));
    assert_eq!(cafe.tags.len(), 2);
}

#[rstest]
fn sanitises_tag_keys_and_values() {
    let diff = document(
        "<create><node id=\"5\" lat=\"0.5\" lon=\"0.5\">\
         <tag k=\" payment:bitcoin\u{0001}\" v=\"yes\u{0085} \"/>\
         <tag k=\"name\" v=\"\u{0007}Sats &amp; Co\u{009F}\"/>\
         </node></create>",
    );
    let changes = classify(diff.as_bytes()).expect("diff should parse");
    let record = changes.created.first().expect("domain tag survives sanitising");
    assert_eq!(
        record.tags.get("payment:bitcoin").map(String::as_str),
        Some("yes")
    );
    assert_eq!(record.tags.get("name").map(String::as_str), Some("Sats & Co"));
}

#[rstest]
#[case(r#"<node lat="1.0" lon="1.0"><tag k="payment:bitcoin" v="yes"/></node>"#)]
#[case(r#"<node id="x" lat="1.0" lon="1.0"><tag k="payment:bitcoin" v="yes"/></node>"#)]
#[case(r#"<node id="6" lon="1.0"><tag k="payment:bitcoin" v="yes"/></node>"#)]
#[case(r#"<node id="6" lat="north" lon="1.0"><tag k="payment:bitcoin" v="yes"/></node>"#)]
#[case(r#"<node id="6" lat="91.0" lon="1.0"><tag k="payment:bitcoin" v="yes"/></node>"#)]
fn skips_entities_without_id_or_coordinates(#[case] entity: &str) {
    let diff = document(&format!("<create>{entity}</create>"));
    let changes = classify(diff.as_bytes()).expect("anomalies do not fail the diff");
    assert!(changes.is_empty());
    assert_eq!(changes.skipped, 1);
}

#[rstest]
fn the_last_version_in_the_document_is_kept() {
    let diff = document(
        r#"
        <modify>
          <node id="9" version="2" lat="1.0" lon="1.0"><tag k="payment:bitcoin" v="no"/></node>
        </modify>
        <modify>
          <node id="9" version="3" lat="1.5" lon="1.0"><tag k="payment:bitcoin" v="yes"/></node>
        </modify>
        "#,
    );
    let changes = classify(diff.as_bytes()).expect("diff should parse");
    assert!(changes.unqualified_modified.is_empty());
    assert_eq!(changes.modified.len(), 1);

    let mut snapshot = VenueSnapshot::from_records([bitcoin_venue(9, 1.0, 1.0)]);
    let outcome = snapshot.apply(&changes);
    assert_eq!(outcome.removed_count, 0);
    let venue = snapshot
        .get(&VenueKey::new(ElementKind::Node, 9))
        .expect("node 9 is tagged in its final version");
    assert_eq!(venue.lat, Some(1.5));
}

#[rstest]
fn deletions_only_need_an_id() {
    let diff = document(r#"<delete><node id="8" version="2"/><relation id="9"/></delete>"#);
    let changes = classify(diff.as_bytes()).expect("diff should parse");
    assert_eq!(changes.deleted.len(), 2);
    assert_eq!(changes.skipped, 0);
}

#[rstest]
fn ignores_entities_outside_sections() {
    let diff = document(r#"<node id="1" lat="1.0" lon="1.0"><tag k="payment:bitcoin" v="yes"/></node>"#);
    let changes = classify(diff.as_bytes()).expect("diff should parse");
    assert!(changes.is_empty());
}

#[rstest]
#[case("<osmChange><create><node id=\"1\" lat=\"1\" lon=\"1\"></create></osmChange>")]
#[case("<osmChange><create><node id=\"1\" lat=\"1\" lon=\"1\"><tag k=\"a\" v=\"b\"/>")]
#[case("<osmChange><create><node id=\"1\" lat=\"1\" lon=\"1\" <tag/></node></create></osmChange>")]
fn malformed_documents_fail(#[case] raw: &str) {
    let outcome = classify(raw.as_bytes());
    assert!(
        matches!(
            outcome,
            Err(ClassifyError::Xml { .. } | ClassifyError::Truncated { .. })
        ),
        "expected a hard failure, got {outcome:?}"
    );
}

#[rstest]
fn classifies_files_on_disk(mixed_diff: String) {
    let mut file = NamedTempFile::new().expect("create temporary diff");
    file.write_all(mixed_diff.as_bytes()).expect("write diff");
    let changes = classify_file(file.path()).expect("diff should parse");
    assert_eq!(changes.created.len(), 2);
}

#[rstest]
fn missing_files_report_their_path() {
    let missing = PathBuf::from("/nonexistent/venue-sync/diff.osc");
    match classify_file(&missing) {
        Err(ClassifyError::Open { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected open error, got {other:?}"),
    }
}
