use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use venue_sync_core::{
    ChangeAction, ChangeRecord, ChangeSet, ElementKind, Tags, sanitise_tag_text,
};

use super::ClassifyError;

#[derive(Debug)]
struct PendingEntity {
    action: ChangeAction,
    kind: ElementKind,
    id: Option<i64>,
    lat: Option<f64>,
    lon: Option<f64>,
    tags: Tags,
}

impl PendingEntity {
    fn has_valid_coordinates(&self) -> bool {
        matches!(
            (self.lat, self.lon),
            (Some(lat), Some(lon))
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
        )
    }

    fn into_record(self) -> Result<(ChangeAction, ChangeRecord), Skip> {
        let Some(id) = self.id else {
            return Err(Skip::MissingId(self.kind));
        };
        if self.action.requires_coordinates() && !self.has_valid_coordinates() {
            return Err(Skip::MissingCoordinates(self.kind, id));
        }
        Ok((
            self.action,
            ChangeRecord {
                id,
                kind: self.kind,
                lat: self.lat,
                lon: self.lon,
                tags: self.tags,
            },
        ))
    }
}

#[derive(Debug)]
enum Skip {
    MissingId(ElementKind),
    MissingCoordinates(ElementKind, i64),
}

#[derive(Debug, Default)]
struct Classifier {
    changes: ChangeSet,
    section: Option<ChangeAction>,
    entity: Option<PendingEntity>,
}

impl Classifier {
    fn open(&mut self, element: &BytesStart<'_>, self_closing: bool) -> Result<(), ClassifyError> {
        let name = element.name();
        if let Some(action) = ChangeAction::from_section_name(name.as_ref()) {
            if !self_closing {
                self.section = Some(action);
            }
            return Ok(());
        }
        if let Some(kind) = ElementKind::from_element_name(name.as_ref()) {
            let Some(action) = self.section else {
                return Ok(());
            };
            self.entity = Some(pending_entity(element, action, kind)?);
            if self_closing {
                self.finish_entity();
            }
            return Ok(());
        }
        if name.as_ref() == b"tag"
            && let Some(entity) = self.entity.as_mut()
        {
            read_tag(element, &mut entity.tags)?;
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        if ElementKind::from_element_name(name).is_some() {
            self.finish_entity();
        } else if ChangeAction::from_section_name(name).is_some() {
            self.section = None;
        }
    }

    fn finish_entity(&mut self) {
        let Some(entity) = self.entity.take() else {
            return;
        };
        match entity.into_record() {
            Ok((action, record)) => {
                self.changes.route(action, record);
            }
            Err(Skip::MissingId(kind)) => {
                warn!("skipping {kind} without a usable id");
                self.changes.skipped += 1;
            }
            Err(Skip::MissingCoordinates(kind, id)) => {
                debug!("skipping {kind}/{id} without valid coordinates");
                self.changes.skipped += 1;
            }
        }
    }

    fn open_element(&self) -> Option<String> {
        if let Some(entity) = &self.entity {
            return Some(entity.kind.as_str().to_owned());
        }
        self.section.map(|action| {
            match action {
                ChangeAction::Create => "create",
                ChangeAction::Modify => "modify",
                ChangeAction::Delete => "delete",
            }
            .to_owned()
        })
    }
}

fn pending_entity(
    element: &BytesStart<'_>,
    action: ChangeAction,
    kind: ElementKind,
) -> Result<PendingEntity, ClassifyError> {
    let mut entity = PendingEntity {
        action,
        kind,
        id: None,
        lat: None,
        lon: None,
        tags: Tags::new(),
    };
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|err| xml_error(0, err.into()))?;
        let value = attribute
            .unescape_value()
            .map_err(|err| xml_error(0, err))?;
        match attribute.key.as_ref() {
            b"id" => entity.id = value.trim().parse().ok(),
            b"lat" => entity.lat = parse_coordinate(&value),
            b"lon" => entity.lon = parse_coordinate(&value),
            _ => {}
        }
    }
    Ok(entity)
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn read_tag(element: &BytesStart<'_>, tags: &mut Tags) -> Result<(), ClassifyError> {
    let mut key = None;
    let mut value = None;
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|err| xml_error(0, err.into()))?;
        match attribute.key.as_ref() {
            b"k" => {
                key = Some(sanitise_tag_text(
                    &attribute.unescape_value().map_err(|err| xml_error(0, err))?,
                ));
            }
            b"v" => {
                value = Some(sanitise_tag_text(
                    &attribute.unescape_value().map_err(|err| xml_error(0, err))?,
                ));
            }
            _ => {}
        }
    }
    if let (Some(key), Some(value)) = (key, value)
        && !key.is_empty()
    {
        tags.insert(key, value);
    }
    Ok(())
}

fn xml_error(position: u64, source: quick_xml::Error) -> ClassifyError {
    ClassifyError::Xml { position, source }
}

/// Classify an osmChange document read from `reader`.
///
/// Entities without an id, and created or modified entities without valid
/// coordinates, are skipped and counted in [`ChangeSet::skipped`]. Malformed
/// XML fails the whole document.
///
/// # Examples
/// ```
/// use venue_sync_data::osc::classify;
///
/// let document = br#"<osmChange version="0.6">
///   <create>
///     <node id="42" lat="10.0" lon="20.0">
///       <tag k="payment:bitcoin" v="yes"/>
///       <tag k="name" v="CafeSats"/>
///     </node>
///     <node id="43" lat="1.0" lon="2.0"><tag k="amenity" v="bench"/></node>
///   </create>
///   <delete><node id="7"/></delete>
/// </osmChange>"#;
///
/// let changes = classify(&document[..]).unwrap();
/// assert_eq!(changes.created.len(), 1);
/// assert_eq!(changes.deleted.len(), 1);
/// ```
pub fn classify<R: BufRead>(reader: R) -> Result<ChangeSet, ClassifyError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);
    let mut classifier = Classifier::default();
    let mut buffer = Vec::new();
    loop {
        let event = xml
            .read_event_into(&mut buffer)
            .map_err(|source| xml_error(xml.error_position(), source))?;
        let outcome = match event {
            Event::Start(element) => classifier.open(&element, false),
            Event::Empty(element) => classifier.open(&element, true),
            Event::End(element) => {
                classifier.close(element.name().as_ref());
                Ok(())
            }
            Event::Eof => break,
            _ => Ok(()),
        };
        outcome.map_err(|err| match err {
            ClassifyError::Xml { source, .. } => xml_error(xml.buffer_position(), source),
            other => other,
        })?;
        buffer.clear();
    }
    if let Some(element) = classifier.open_element() {
        return Err(ClassifyError::Truncated { element });
    }
    let changes = classifier.changes;
    debug!(
        "classified diff: {} created, {} modified, {} deleted, {} unqualified, {} skipped",
        changes.created.len(),
        changes.modified.len(),
        changes.deleted.len(),
        changes.unqualified_modified.len(),
        changes.skipped
    );
    Ok(changes)
}

/// Classify the osmChange document stored at `path`.
pub fn classify_file(path: &Path) -> Result<ChangeSet, ClassifyError> {
    let file = File::open(path).map_err(|source| ClassifyError::Open {
        source,
        path: path.to_path_buf(),
    })?;
    classify(BufReader::new(file))
}
