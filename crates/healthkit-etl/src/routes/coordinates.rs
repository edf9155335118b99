//! First-trackpoint extraction from GPX route files
//!
//! Route files can hold tens of thousands of points; only the first one is
//! needed, so the file is read as an event stream and abandoned as soon as a
//! usable `<trkpt>` has been seen.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use xml::reader::{ParserConfig, XmlEvent};

use crate::models::Coordinate;

const GPX_ROOT: &str = "gpx";
const TRACKPOINT: &str = "trkpt";

/// Return the first valid trackpoint in document order.
///
/// Returns `None` when the document is not GPX, has no trackpoint, or becomes
/// unparseable before one is found. Trackpoints with missing or out-of-range
/// `lat`/`lon` are passed over.
pub fn first_trackpoint<R: Read>(reader: R) -> Option<Coordinate> {
    let mut events = ParserConfig::new()
        .trim_whitespace(true)
        .ignore_comments(true)
        .create_reader(BufReader::new(reader));

    let mut seen_root = false;
    loop {
        match events.next() {
            Ok(XmlEvent::StartElement {
                name, attributes, ..
            }) => {
                if !seen_root {
                    if name.local_name != GPX_ROOT {
                        tracing::debug!("Route file root is <{}>, not <gpx>", name.local_name);
                        return None;
                    }
                    seen_root = true;
                    continue;
                }
                if name.local_name != TRACKPOINT {
                    continue;
                }
                let attr = |key: &str| {
                    attributes
                        .iter()
                        .find(|a| a.name.local_name == key)
                        .and_then(|a| a.value.trim().parse::<f64>().ok())
                };
                if let (Some(lat), Some(lon)) = (attr("lat"), attr("lon")) {
                    if let Some(coordinate) = Coordinate::checked(lat, lon) {
                        return Some(coordinate);
                    }
                }
                tracing::debug!("Passing over trackpoint without usable lat/lon");
            }
            Ok(XmlEvent::EndDocument) => return None,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Route file is not parseable: {}", e);
                return None;
            }
        }
    }
}

/// Open `path` and return its first trackpoint. Only opening the file can fail.
pub fn first_trackpoint_in_file(path: &Path) -> std::io::Result<Option<Coordinate>> {
    let file = File::open(path)?;
    Ok(first_trackpoint(file))
}
