//! Framed reads
//!
//! Every logger response starts with the `##` marker. Bytes received before
//! the marker are line noise and are dropped; a trailing `#` is kept in case
//! the marker is split across two reads. A frame ends either after a known
//! number of bytes (counted from the marker) or at the first `\r\n`.

use super::stream::Link;
use super::transport::{Poll, Transport};
use super::{ProtocolError, FRAME_BUFFER_SIZE};
use crate::logging::{LEVEL_MESSAGES, LEVEL_RAW};

/// Marker that opens every device response
pub const START_MARKER: [u8; 2] = [0x23, 0x23];

/// Terminator of variable-length responses
pub const TERMINATOR: [u8; 2] = [b'\r', b'\n'];

/// How a frame ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    /// Fixed length, marker included
    Exact(usize),
    /// Up to and including `\r\n`
    Terminator,
}

/// Result of a framed read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The frame is complete and this many bytes long
    Complete(usize),
    /// A poll interval passed without completing the frame
    Timeout,
}

/// Accumulates one frame across any number of reads
///
/// State survives a timed-out read, so a caller may keep polling for the
/// rest of a frame the device delivered in pieces.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    end: FrameEnd,
    buf: Vec<u8>,
    started: bool,
    complete: Option<usize>,
    overflow: bool,
    discarded: usize,
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

impl FrameAccumulator {
    /// Empty accumulator waiting for a start marker
    pub fn new(end: FrameEnd) -> Self {
        let capacity = match end {
            FrameEnd::Exact(n) => n + START_MARKER.len(),
            FrameEnd::Terminator => 64,
        };
        Self {
            end,
            buf: Vec::with_capacity(capacity),
            started: false,
            complete: None,
            overflow: false,
            discarded: 0,
        }
    }

    /// Frame of exactly `len` bytes starting at the marker
    pub fn exact(len: usize) -> Self {
        Self::new(FrameEnd::Exact(len))
    }

    /// Frame ending with `\r\n`
    pub fn terminated() -> Self {
        Self::new(FrameEnd::Terminator)
    }

    /// Feed freshly received bytes; returns the frame length once complete
    pub fn push(&mut self, chunk: &[u8]) -> Option<usize> {
        if self.complete.is_some() || self.overflow {
            return self.complete;
        }

        self.buf.extend_from_slice(chunk);

        if !self.started {
            match find(&self.buf, &START_MARKER) {
                Some(pos) => {
                    self.discarded += pos;
                    self.buf.drain(..pos);
                    self.started = true;
                }
                None => {
                    let keep_partial = self.buf.last() == Some(&START_MARKER[0]);
                    self.discarded += self.buf.len() - usize::from(keep_partial);
                    self.buf.clear();
                    if keep_partial {
                        self.buf.push(START_MARKER[0]);
                    }
                    return None;
                }
            }
        }

        let len = match self.end {
            FrameEnd::Exact(n) => (self.buf.len() >= n).then_some(n),
            FrameEnd::Terminator => find(&self.buf, &TERMINATOR).map(|pos| pos + TERMINATOR.len()),
        };

        match len {
            Some(n) => {
                self.buf.truncate(n);
                self.complete = Some(n);
            }
            None if self.buf.len() >= FRAME_BUFFER_SIZE => {
                self.buf.truncate(FRAME_BUFFER_SIZE);
                self.overflow = true;
            }
            None => {}
        }
        self.complete
    }

    /// Length of the completed frame
    pub fn completed(&self) -> Option<usize> {
        self.complete
    }

    /// The start marker has been seen
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// The buffer filled up without a terminator
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// Bytes collected from the marker on (0 before the marker)
    pub fn received(&self) -> usize {
        if self.started {
            self.buf.len()
        } else {
            0
        }
    }

    /// Noise bytes dropped while hunting for the marker
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Frame bytes, marker first; partial until complete
    pub fn frame(&self) -> &[u8] {
        if self.started {
            &self.buf
        } else {
            &[]
        }
    }

    /// Bytes from the start marker on; empty when no marker was seen
    pub fn into_frame(mut self) -> Vec<u8> {
        if !self.started {
            self.buf.clear();
        }
        self.buf
    }
}

impl<L: Link> Transport<L> {
    /// Poll until `frame` completes or a poll interval passes without data
    pub fn read_frame(&mut self, frame: &mut FrameAccumulator) -> Result<ReadOutcome, ProtocolError> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(n) = frame.completed() {
                if self.log.enabled(LEVEL_MESSAGES) {
                    tracing::trace!("read: frame complete, {} bytes", n);
                }
                return Ok(ReadOutcome::Complete(n));
            }
            if frame.overflowed() {
                tracing::warn!(
                    "read: no message end found within {} bytes",
                    FRAME_BUFFER_SIZE
                );
                return Ok(ReadOutcome::Timeout);
            }

            match self.poll(&mut chunk)? {
                Poll::Data(n) => {
                    if self.log.enabled(LEVEL_RAW) {
                        self.log.dump("recv", &chunk[..n]);
                    }
                    let was_started = frame.is_started();
                    frame.push(&chunk[..n]);
                    if self.log.enabled(LEVEL_MESSAGES) {
                        if !frame.is_started() {
                            tracing::trace!("read: no msg start found");
                        } else if !was_started {
                            tracing::trace!(
                                "read: msg start found after {} noise bytes",
                                frame.discarded()
                            );
                        }
                    }
                }
                Poll::Timeout => {
                    if self.log.enabled(LEVEL_MESSAGES) {
                        tracing::trace!("read: timeout reached with {} bytes", frame.received());
                    }
                    return Ok(ReadOutcome::Timeout);
                }
            }
        }
    }

    /// Read one complete response for a single-shot command
    ///
    /// A timeout here is final: single-shot commands are not re-polled.
    pub fn read_response(
        &mut self,
        end: FrameEnd,
        command: &'static str,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut frame = FrameAccumulator::new(end);
        match self.read_frame(&mut frame)? {
            ReadOutcome::Complete(_) => {
                let bytes = frame.into_frame();
                self.log.dump("recv frame", &bytes);
                Ok(bytes)
            }
            ReadOutcome::Timeout => Err(ProtocolError::Timeout(command)),
        }
    }
}
