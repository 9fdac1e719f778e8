//! GPX 1.1 track writer.
//!
//! Writes a downloaded track as a single `trk`/`trkseg` with one `trkpt`
//! per point.

use super::{GeoPoint, PointCollection};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str =
    "http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd";

/// Name of the single track in every file
pub const TRACK_NAME: &str = "Route1";

/// Errors that can occur during track writing.
#[derive(Debug, thiserror::Error)]
pub enum TrackWriteError {
    /// XML serialization failed
    #[error("XML writing error: {0}")]
    XmlError(#[from] quick_xml::Error),
    /// Output could not be written
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// JSON serialization failed
    #[error("JSON writing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Write `track` as a GPX document to `out`.
pub fn write_gpx<W: Write>(track: &PointCollection, out: W) -> Result<(), TrackWriteError> {
    let mut writer = Writer::new_with_indent(out, b' ', 1);

    writer.write_event(Event::Decl(BytesDecl::new(
        "1.0",
        Some("UTF-8"),
        Some("no"),
    )))?;

    let mut root = BytesStart::new("gpx");
    root.push_attribute(("xmlns", GPX_NAMESPACE));
    root.push_attribute(("creator", concat!("geologger ", env!("CARGO_PKG_VERSION"))));
    root.push_attribute(("version", "1.1"));
    root.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
    root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
    writer.write_event(Event::Start(root))?;

    writer.write_event(Event::Start(BytesStart::new("metadata")))?;
    write_text_element(
        &mut writer,
        "desc",
        "GPS track logger, data downloaded with geologger",
    )?;
    writer.write_event(Event::End(BytesEnd::new("metadata")))?;

    writer.write_event(Event::Start(BytesStart::new("trk")))?;
    write_text_element(&mut writer, "name", TRACK_NAME)?;
    writer.write_event(Event::Start(BytesStart::new("trkseg")))?;
    for point in track {
        write_track_point(&mut writer, point)?;
    }
    writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
    writer.write_event(Event::End(BytesEnd::new("trk")))?;

    writer.write_event(Event::End(BytesEnd::new("gpx")))?;
    writer.into_inner().flush()?;
    Ok(())
}

/// Render `track` as a GPX string.
pub fn gpx_string(track: &PointCollection) -> Result<String, TrackWriteError> {
    let mut buf = Vec::new();
    write_gpx(track, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).to_string())
}

/// Create (or truncate) `path` and write `track` to it as GPX.
pub fn write_gpx_file(track: &PointCollection, path: &Path) -> Result<(), TrackWriteError> {
    let file = File::create(path)?;
    write_gpx(track, BufWriter::new(file))
}

fn write_track_point<W: Write>(
    writer: &mut Writer<W>,
    point: &GeoPoint,
) -> Result<(), TrackWriteError> {
    let mut elem = BytesStart::new("trkpt");
    elem.push_attribute(("lat", format!("{:.6}", point.latitude).as_str()));
    elem.push_attribute(("lon", format!("{:.6}", point.longitude).as_str()));
    writer.write_event(Event::Start(elem))?;

    write_text_element(writer, "ele", &format!("{:.6}", point.height))?;
    write_text_element(writer, "time", &point.timestamp.to_string())?;

    writer.write_event(Event::End(BytesEnd::new("trkpt")))?;
    Ok(())
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), TrackWriteError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
