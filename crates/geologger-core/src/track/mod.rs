//! Downloaded track data
//!
//! Points decoded from the logger, the ordered collection a download
//! produces, and export to GPX or JSON files.

pub mod gpx;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub use gpx::{write_gpx, write_gpx_file, TrackWriteError};

/// Years on the wire are offsets from this epoch
pub const YEAR_EPOCH: u16 = 2000;

/// UTC timestamp as recorded by the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// 0-59
    pub second: u8,
    /// 0-59
    pub minute: u8,
    /// 0-23
    pub hour: u8,
    /// 1-31 on a valid record
    pub day: u8,
    /// 1-12 on a valid record
    pub month: u8,
    /// Full year, always >= 2000
    pub year: u16,
}

impl Timestamp {
    /// Unpack the logger's 4-byte time field
    ///
    /// ```text
    /// byte 0: mm ssssss      seconds bits 0-5, minutes bits 0-1
    /// byte 1: hhhh mmmm      minutes bits 2-5, hours bits 0-3
    /// byte 2: MM ddddd h     hours bit 4, day bits 0-4, month bits 0-1
    /// byte 3: yyyyyy MM      month bits 2-3, year offset bits 0-5
    /// ```
    pub fn from_packed(bytes: [u8; 4]) -> Self {
        Self {
            second: bytes[0] & 0b0011_1111,
            minute: ((bytes[0] & 0b1100_0000) >> 6) | ((bytes[1] & 0b0000_1111) << 2),
            hour: ((bytes[1] & 0b1111_0000) >> 4) | ((bytes[2] & 0b0000_0001) << 4),
            day: (bytes[2] & 0b0011_1110) >> 1,
            month: ((bytes[2] & 0b1100_0000) >> 6) | ((bytes[3] & 0b0000_0011) << 2),
            year: YEAR_EPOCH + u16::from((bytes[3] & 0b1111_1100) >> 2),
        }
    }

    /// Inverse of [`Timestamp::from_packed`]; out-of-range fields are masked
    pub fn to_packed(&self) -> [u8; 4] {
        let year = (self.year.saturating_sub(YEAR_EPOCH) as u8) & 0b0011_1111;
        [
            (self.second & 0b0011_1111) | ((self.minute & 0b0000_0011) << 6),
            ((self.minute & 0b0011_1100) >> 2) | ((self.hour & 0b0000_1111) << 4),
            ((self.hour & 0b0001_0000) >> 4)
                | ((self.day & 0b0001_1111) << 1)
                | ((self.month & 0b0000_0011) << 6),
            ((self.month & 0b0000_1100) >> 2) | (year << 2),
        ]
    }

    /// Calendar value, or `None` when the logger recorded an impossible date
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year.into(), self.month.into(), self.day.into())?.and_hms_opt(
            self.hour.into(),
            self.minute.into(),
            self.second.into(),
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            // Keep the raw fields so nothing recorded is lost
            None => write!(
                f,
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
                self.year, self.month, self.day, self.hour, self.minute, self.second
            ),
        }
    }
}

/// One recorded track point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Degrees
    pub longitude: f64,
    /// Degrees
    pub latitude: f64,
    /// Device height units
    pub height: f64,
    /// When the point was recorded
    pub timestamp: Timestamp,
}

/// Upper bound on the capacity reserved up front for an announced count
const RESERVE_LIMIT: usize = 1024;

/// Ordered points of one download plus the count the device announced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCollection {
    count: usize,
    points: Vec<GeoPoint>,
}

impl PointCollection {
    /// Empty collection expecting `count` points
    ///
    /// The count comes off the wire, so only a bounded amount is reserved.
    pub fn with_count(count: usize) -> Self {
        Self {
            count,
            points: Vec::with_capacity(count.min(RESERVE_LIMIT)),
        }
    }

    /// Empty collection expecting nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, point: GeoPoint) {
        self.points.push(point);
    }

    /// Count announced by the device
    pub fn declared_count(&self) -> usize {
        self.count
    }

    /// Points received so far
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// No points received
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Every announced point has been received
    pub fn is_complete(&self) -> bool {
        self.points.len() == self.count
    }

    /// Points in download order
    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    /// Iterate in download order
    pub fn iter(&self) -> std::slice::Iter<'_, GeoPoint> {
        self.points.iter()
    }

    /// Take the points, dropping the announced count
    pub fn into_points(self) -> Vec<GeoPoint> {
        self.points
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, TrackWriteError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<'a> IntoIterator for &'a PointCollection {
    type Item = &'a GeoPoint;
    type IntoIter = std::slice::Iter<'a, GeoPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Output format picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFormat {
    /// GPX 1.1 document
    Gpx,
    /// The collection as pretty-printed JSON
    Json,
}

impl TrackFormat {
    /// `.json` selects JSON; everything else is GPX
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => TrackFormat::Json,
            _ => TrackFormat::Gpx,
        }
    }
}

/// Write a downloaded track to `path` in the format its extension names
pub fn write_track_file(
    track: &PointCollection,
    path: impl AsRef<Path>,
) -> Result<TrackFormat, TrackWriteError> {
    let path = path.as_ref();
    let format = TrackFormat::from_path(path);
    match format {
        TrackFormat::Gpx => write_gpx_file(track, path)?,
        TrackFormat::Json => std::fs::write(path, track.to_json()?)?,
    }
    tracing::info!("wrote {} points to {}", track.len(), path.display());
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ts(second: u8, minute: u8, hour: u8, day: u8, month: u8, year: u16) -> Timestamp {
        Timestamp {
            second,
            minute,
            hour,
            day,
            month,
            year,
        }
    }

    #[test]
    fn test_decode_new_year_2000() {
        // 00:00:00 on 1 January 2000: day=1 -> byte2 bit1, month=1 -> byte2 bit6
        assert_eq!(
            Timestamp::from_packed([0x00, 0x00, 0x42, 0x00]),
            ts(0, 0, 0, 1, 1, 2000)
        );
    }

    #[test]
    fn test_decode_end_of_month() {
        // 2012-04-30 23:59:59
        // byte0 = 59 | (59 & 3) << 6 = 0x3b | 0xc0 = 0xfb
        // byte1 = (59 >> 2) | (23 & 0xf) << 4 = 0x0e | 0x70 = 0x7e
        // byte2 = (23 >> 4) | 30 << 1 | (4 & 3) << 6 = 0x01 | 0x3c | 0x00 = 0x3d
        // byte3 = (4 >> 2) | 12 << 2 = 0x01 | 0x30 = 0x31
        assert_eq!(
            Timestamp::from_packed([0xfb, 0x7e, 0x3d, 0x31]),
            ts(59, 59, 23, 30, 4, 2012)
        );
    }

    #[test]
    fn test_decode_year_boundary() {
        // 2013-12-31 23:59:58 then 2014-01-01 00:00:01
        // byte2 = 1 | 31 << 1 | (12 & 3) << 6 = 0x01 | 0x3e = 0x3f
        // byte3 = (12 >> 2) | 13 << 2 = 0x03 | 0x34 = 0x37
        assert_eq!(
            Timestamp::from_packed([0xfa, 0x7e, 0x3f, 0x37]),
            ts(58, 59, 23, 31, 12, 2013)
        );
        // byte2 = 1 << 1 | (1 & 3) << 6 = 0x42; byte3 = 14 << 2 = 0x38
        assert_eq!(
            Timestamp::from_packed([0x01, 0x00, 0x42, 0x38]),
            ts(1, 0, 0, 1, 1, 2014)
        );
    }

    #[test]
    fn test_decode_max_year_offset() {
        let decoded = Timestamp::from_packed([0, 0, 0, 0xfc]);
        assert_eq!(decoded.year, 2063);
        assert!(decoded.year >= YEAR_EPOCH);
    }

    #[test]
    fn test_pack_matches_hand_encoding() {
        assert_eq!(ts(59, 59, 23, 30, 4, 2012).to_packed(), [0xfb, 0x7e, 0x3d, 0x31]);
    }

    #[test]
    fn test_display_iso() {
        assert_eq!(ts(7, 38, 13, 1, 4, 2012).to_string(), "2012-04-01T13:38:07Z");
        // Impossible dates keep their raw fields
        assert_eq!(ts(0, 0, 0, 0, 0, 2000).to_string(), "2000-00-00T00:00:00Z");
        assert!(ts(0, 0, 0, 31, 2, 2001).to_datetime().is_none());
    }

    #[test]
    fn test_collection_completeness() {
        let mut track = PointCollection::with_count(2);
        assert!(!track.is_complete());
        let point = GeoPoint {
            longitude: 24.9,
            latitude: 60.1,
            height: 12.0,
            timestamp: ts(0, 0, 12, 1, 6, 2012),
        };
        track.push(point);
        track.push(point);
        assert!(track.is_complete());
        assert_eq!(track.len(), 2);
        assert_eq!(track.iter().count(), 2);
    }

    #[test]
    fn test_announced_count_bounds_reservation() {
        let track = PointCollection::with_count(usize::MAX);
        assert_eq!(track.declared_count(), usize::MAX);
        assert!(track.points.capacity() <= RESERVE_LIMIT);
        assert!(!track.is_complete());
    }

    #[test]
    fn test_track_format_from_path() {
        assert_eq!(TrackFormat::from_path(Path::new("a.gpx")), TrackFormat::Gpx);
        assert_eq!(TrackFormat::from_path(Path::new("a.JSON")), TrackFormat::Json);
        assert_eq!(TrackFormat::from_path(Path::new("track")), TrackFormat::Gpx);
    }
}
