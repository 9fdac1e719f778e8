//! Track download
//!
//! After the download-start exchange announces the point count, points are
//! fetched one at a time: each request names the point index and the device
//! answers with a 20-byte record, possibly in several pieces.

use super::commands::parse_decimal;
use super::framing::{FrameAccumulator, FrameEnd, ReadOutcome};
use super::messages::{
    download_entry_message, DOWNLOAD_ENTRY, DOWNLOAD_START, DOWNLOAD_START_RESPONSE,
    RESPONSE_PREFIX_LEN,
};
use super::record::{decode_record, verify_record, Record, RECORD_SIZE};
use super::stream::Link;
use super::transport::Transport;
use super::validate::expect;
use super::{ProtocolError, POINT_READ_ATTEMPTS};
use crate::logging::{LEVEL_CALLS, LEVEL_DETAIL, LEVEL_MESSAGES};
use crate::track::{GeoPoint, PointCollection};

/// Parse `<count_a>,<count_b>*` after the 3-byte acknowledgment prefix
///
/// `0,0` means no points; `n,n+1` with `n > 0` means `n` points. Any other
/// pair is an inconsistent count.
pub fn parse_point_count(response: &[u8]) -> Result<usize, ProtocolError> {
    let body = response.get(RESPONSE_PREFIX_LEN..).unwrap_or_default();

    let comma = body
        .iter()
        .position(|&b| b == b',')
        .ok_or_else(|| ProtocolError::ParseError("cannot find ',' to separate fields".into()))?;
    let star = body
        .iter()
        .position(|&b| b == b'*')
        .ok_or_else(|| ProtocolError::ParseError("cannot find '*' to end fields".into()))?;
    if star < comma {
        return Err(ProtocolError::ParseError(
            "'*' before ',' in point count".into(),
        ));
    }

    let count_a = parse_decimal(&body[..comma], "point count")?;
    let count_b = parse_decimal(&body[comma + 1..star], "point count")?;

    match (count_a, count_b) {
        (0, 0) => Ok(0),
        (a, b) if a > 0 && b.checked_sub(1) == Some(a) => Ok(a as usize),
        (a, b) => Err(ProtocolError::ParseError(format!(
            "unexpected numbers parsed: {}, {}",
            a, b
        ))),
    }
}

/// Bulk transfer over a borrowed transport
pub struct DownloadProtocol<'t, L: Link> {
    transport: &'t mut Transport<L>,
    read_attempts: usize,
}

impl<'t, L: Link> DownloadProtocol<'t, L> {
    /// Borrow `transport` with the default poll ceiling
    pub fn new(transport: &'t mut Transport<L>) -> Self {
        Self {
            transport,
            read_attempts: POINT_READ_ATTEMPTS,
        }
    }

    /// Override the per-record poll ceiling (at least 1)
    pub fn with_read_attempts(mut self, attempts: usize) -> Self {
        self.read_attempts = attempts.max(1);
        self
    }

    /// Download every stored point
    ///
    /// Any failing point aborts the whole download; nothing partial is
    /// returned.
    pub fn download(&mut self) -> Result<PointCollection, ProtocolError> {
        self.download_with_progress(|_, _| {})
    }

    /// Like [`download`](Self::download), reporting `(done, total)` after each point
    pub fn download_with_progress(
        &mut self,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<PointCollection, ProtocolError> {
        let count = self.start()?;
        let mut track = PointCollection::with_count(count);

        for index in 0..count {
            let point = self.fetch_point(index)?;
            if self.transport.log().enabled(LEVEL_CALLS) {
                tracing::debug!(
                    "downloaded entry {} LON {:.6} LAT {:.6} HEI {}",
                    index,
                    point.longitude,
                    point.latitude,
                    point.height
                );
            }
            track.push(point);
            progress(index + 1, count);
        }

        debug_assert!(track.is_complete());
        Ok(track)
    }

    /// Send download-start and return the announced point count
    pub fn start(&mut self) -> Result<usize, ProtocolError> {
        if self.transport.log().enabled(LEVEL_CALLS) {
            tracing::debug!("CALL: download samples");
        }

        self.transport.write(DOWNLOAD_START.bytes)?;
        let response = self
            .transport
            .read_response(FrameEnd::Terminator, DOWNLOAD_START.name)?;
        let log = *self.transport.log();
        expect(&response, &DOWNLOAD_START_RESPONSE, RESPONSE_PREFIX_LEN, &log)?;

        let count = parse_point_count(&response)?;
        if log.enabled(LEVEL_DETAIL) {
            tracing::debug!("device reports {} points", count);
        }
        Ok(count)
    }

    /// Request, read and decode one point
    pub fn fetch_point(&mut self, index: usize) -> Result<GeoPoint, ProtocolError> {
        let log = *self.transport.log();
        if log.enabled(LEVEL_MESSAGES) {
            tracing::trace!("downloading item {}", index);
        }

        self.transport.write(&download_entry_message(index))?;

        let mut frame = FrameAccumulator::exact(RECORD_SIZE);
        for attempt in 1..=self.read_attempts {
            let (_, rx_before) = self.transport.counters();
            match self.transport.read_frame(&mut frame)? {
                ReadOutcome::Complete(_) => break,
                ReadOutcome::Timeout if self.transport.counters().1 == rx_before => {
                    if log.enabled(LEVEL_MESSAGES) {
                        tracing::trace!(
                            "point {}: no data on poll {}, {} of {} bytes",
                            index,
                            attempt,
                            frame.received(),
                            RECORD_SIZE
                        );
                    }
                    break;
                }
                ReadOutcome::Timeout => continue,
            }
        }

        if frame.received() == 0 {
            return Err(ProtocolError::Timeout(DOWNLOAD_ENTRY.name));
        }

        // Positions the device never sent stay zero
        let mut record: Record = [0u8; RECORD_SIZE];
        let received = frame.frame();
        record[..received.len()].copy_from_slice(received);
        log.dump("record", &record);

        verify_record(&record).map_err(|(expected, actual)| {
            tracing::error!("download failed at checksum of point {}", index);
            ProtocolError::ChecksumMismatch {
                index,
                expected,
                actual,
            }
        })?;

        Ok(decode_record(&record))
    }
}
