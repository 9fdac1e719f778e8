//! Track point records
//!
//! Record format (20 bytes):
//! - 3 bytes: request echo (`## 0xF7`)
//! - 4 bytes: longitude, little-endian, micro-degrees
//! - 4 bytes: latitude, little-endian, micro-degrees
//! - 2 bytes: height, little-endian
//! - 2 bytes: reserved
//! - 4 bytes: packed timestamp
//! - 1 byte:  checksum of the 19 bytes before it

use byteorder::{ByteOrder, LittleEndian};

use crate::track::{GeoPoint, Timestamp};

/// Size of one point record
pub const RECORD_SIZE: usize = 20;

/// Added to the byte sum to form the record checksum
pub const CHECKSUM_SEED: u8 = 0xBA;

const CHECKSUM_OFFSET: usize = RECORD_SIZE - 1;
const LONGITUDE_OFFSET: usize = 3;
const LATITUDE_OFFSET: usize = 7;
const HEIGHT_OFFSET: usize = 11;
const TIME_OFFSET: usize = 15;

/// Degrees per coordinate unit
const COORDINATE_SCALE: f64 = 0.000001;

/// A raw record
pub type Record = [u8; RECORD_SIZE];

/// `(sum of bytes 0..19 + 0xBA) mod 256`
pub fn record_checksum(record: &Record) -> u8 {
    record[..CHECKSUM_OFFSET]
        .iter()
        .fold(CHECKSUM_SEED, |sum, &b| sum.wrapping_add(b))
}

/// Check the trailing checksum byte; on mismatch returns (expected, actual)
pub fn verify_record(record: &Record) -> Result<(), (u8, u8)> {
    let expected = record_checksum(record);
    let actual = record[CHECKSUM_OFFSET];
    if expected == actual {
        Ok(())
    } else {
        Err((expected, actual))
    }
}

/// Decode the point fields of a record (the checksum is not checked here)
pub fn decode_record(record: &Record) -> GeoPoint {
    let longitude = LittleEndian::read_u32(&record[LONGITUDE_OFFSET..LATITUDE_OFFSET]);
    let latitude = LittleEndian::read_u32(&record[LATITUDE_OFFSET..HEIGHT_OFFSET]);
    let height = LittleEndian::read_u16(&record[HEIGHT_OFFSET..HEIGHT_OFFSET + 2]);

    let mut time = [0u8; 4];
    time.copy_from_slice(&record[TIME_OFFSET..TIME_OFFSET + 4]);

    GeoPoint {
        longitude: f64::from(longitude) * COORDINATE_SCALE,
        latitude: f64::from(latitude) * COORDINATE_SCALE,
        height: f64::from(height),
        timestamp: Timestamp::from_packed(time),
    }
}

/// Build the record a logger would send for `point`, checksum included
pub fn encode_record(point: &GeoPoint) -> Record {
    let mut record = [0u8; RECORD_SIZE];
    record[..3].copy_from_slice(super::messages::DOWNLOAD_ENTRY.bytes);
    LittleEndian::write_u32(
        &mut record[LONGITUDE_OFFSET..LATITUDE_OFFSET],
        to_micro_degrees(point.longitude),
    );
    LittleEndian::write_u32(
        &mut record[LATITUDE_OFFSET..HEIGHT_OFFSET],
        to_micro_degrees(point.latitude),
    );
    LittleEndian::write_u16(
        &mut record[HEIGHT_OFFSET..HEIGHT_OFFSET + 2],
        point.height.round().clamp(0.0, f64::from(u16::MAX)) as u16,
    );
    record[TIME_OFFSET..TIME_OFFSET + 4].copy_from_slice(&point.timestamp.to_packed());
    record[CHECKSUM_OFFSET] = record_checksum(&record);
    record
}

fn to_micro_degrees(degrees: f64) -> u32 {
    (degrees / COORDINATE_SCALE)
        .round()
        .clamp(0.0, f64::from(u32::MAX)) as u32
}
