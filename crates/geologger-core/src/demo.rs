//! Demo Mode - Simulated GPS logger
//!
//! A logger that lives in memory and speaks the same wire protocol as the
//! hardware, so every command can run without a device attached. Faults can
//! be injected to exercise framing resync, the reset fallback and checksum
//! handling.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::rc::Rc;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::protocol::messages::{
    download_entry_check, CLEAR, DOWNLOAD_ENTRY, DOWNLOAD_START, QUERY_SAMPLING, RESET,
    RESET_RESPONSE, SET_SAMPLING, SET_SAMPLING_DIGITS, SPEED_PHASE_ONE, SPEED_PHASE_TWO,
};
use crate::protocol::record::{decode_record, encode_record, RECORD_SIZE};
use crate::protocol::{Link, LinkOpener, LinkSpeed, ProtocolError};
use crate::track::{GeoPoint, Timestamp};

/// Sampling interval a fresh demo logger reports
pub const DEFAULT_DEMO_SAMPLE_RATE: u32 = 5;

/// Faults the simulated logger injects
#[derive(Debug, Clone, Default)]
pub struct DemoFaults {
    /// Noise sent ahead of every reply
    pub garbage_prefix: Vec<u8>,
    /// Deliver replies in pieces of this size
    pub chunk_size: Option<usize>,
    /// Pause one poll interval in the middle of every record
    pub record_gap: bool,
    /// Answer this many speed phase 2 requests with a wrong status
    pub fail_phase_two: usize,
    /// Send this point with a broken checksum
    pub corrupt_point: Option<usize>,
    /// Announce these counts instead of the real ones
    pub counts_override: Option<(u32, u32)>,
    /// Never answer anything
    pub silent: bool,
    /// Refuse to open the link
    pub fail_open: bool,
}

/// What the simulated logger has seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemoStats {
    /// Links opened
    pub opens: usize,
    /// Commands understood
    pub commands: usize,
    /// Commands dropped because the line speeds did not match
    pub ignored: usize,
    /// Resets taken
    pub resets: usize,
    /// Clear commands taken
    pub clears: usize,
}

#[derive(Debug)]
enum Step {
    Data(Vec<u8>),
    Gap,
}

#[derive(Debug)]
struct DeviceState {
    speed: LinkSpeed,
    sample_rate: u32,
    points: Vec<GeoPoint>,
    faults: DemoFaults,
    phase_two_failures: usize,
    stats: DemoStats,
}

impl DeviceState {
    /// Handle one command written at `line_speed`; returns the reply steps
    fn handle(&mut self, command: &[u8], line_speed: LinkSpeed) -> Vec<Step> {
        if command.len() < 3 || command[..2] != RESET.bytes[..2] {
            self.stats.ignored += 1;
            return Vec::new();
        }
        let opcode = command[2];

        // Reset is recognised at either speed
        if opcode != RESET.opcode() && line_speed != self.speed {
            tracing::trace!(
                "demo: {:02x} sent at {:?}, device at {:?}",
                opcode,
                line_speed,
                self.speed
            );
            self.stats.ignored += 1;
            return Vec::new();
        }
        self.stats.commands += 1;

        let reply = match opcode {
            op if op == RESET.opcode() => {
                self.stats.resets += 1;
                self.speed = LinkSpeed::Low;
                RESET_RESPONSE.bytes.to_vec()
            }
            op if op == SPEED_PHASE_ONE.opcode() => {
                self.speed = LinkSpeed::High;
                b"##\xf1\x04\x01\r\n".to_vec()
            }
            op if op == SPEED_PHASE_TWO.opcode() => {
                if self.phase_two_failures < self.faults.fail_phase_two {
                    self.phase_two_failures += 1;
                    b"##\xf2ER0\r\n".to_vec()
                } else {
                    b"##\xf2OK1\r\n".to_vec()
                }
            }
            op if op == QUERY_SAMPLING.opcode() => {
                let mut reply = QUERY_SAMPLING.bytes[..3].to_vec();
                reply.extend_from_slice(
                    format!("{},{}*\r\n", self.sample_rate, self.points.len()).as_bytes(),
                );
                reply
            }
            op if op == SET_SAMPLING.opcode() => {
                let (tens_at, units_at) = SET_SAMPLING_DIGITS;
                let digits = match command.get(tens_at..=units_at) {
                    Some(d) if d.iter().all(u8::is_ascii_digit) => [d[0], d[1]],
                    _ => return Vec::new(),
                };
                self.sample_rate = u32::from(digits[0] - b'0') * 10 + u32::from(digits[1] - b'0');
                let mut reply = SET_SAMPLING.bytes[..3].to_vec();
                reply.extend_from_slice(&digits);
                reply.extend_from_slice(b"\r\n");
                reply
            }
            op if op == CLEAR.opcode() => {
                self.stats.clears += 1;
                self.points.clear();
                return Vec::new();
            }
            op if op == DOWNLOAD_START.opcode() => {
                let n = self.points.len() as u32;
                let (a, b) = self
                    .faults
                    .counts_override
                    .unwrap_or(if n == 0 { (0, 0) } else { (n, n + 1) });
                let mut reply = DOWNLOAD_START.bytes[..3].to_vec();
                reply.extend_from_slice(format!("{},{}*\r\n", a, b).as_bytes());
                reply
            }
            op if op == DOWNLOAD_ENTRY.opcode() => return self.record_reply(command),
            _ => {
                self.stats.ignored += 1;
                return Vec::new();
            }
        };

        if self.faults.silent {
            return Vec::new();
        }
        self.package(reply)
    }

    fn record_reply(&mut self, command: &[u8]) -> Vec<Step> {
        let body = &command[DOWNLOAD_ENTRY.len()..];
        let Some(star) = body.iter().position(|&b| b == b'*') else {
            return Vec::new();
        };
        let index = match std::str::from_utf8(&body[..star])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            Some(i) => i,
            None => return Vec::new(),
        };
        if body.get(star + 1) != Some(&download_entry_check(index)) {
            tracing::trace!("demo: bad check byte for entry {}", index);
            return Vec::new();
        }
        let Some(point) = self.points.get(index) else {
            return Vec::new();
        };

        let mut record = encode_record(point);
        if self.faults.corrupt_point == Some(index) {
            record[RECORD_SIZE - 1] = record[RECORD_SIZE - 1].wrapping_add(1);
        }
        if self.faults.silent {
            return Vec::new();
        }

        if self.faults.record_gap {
            let half = RECORD_SIZE / 2;
            let mut steps = self.package(record[..half].to_vec());
            steps.push(Step::Gap);
            steps.extend(chunked(record[half..].to_vec(), self.faults.chunk_size));
            steps
        } else {
            self.package(record.to_vec())
        }
    }

    fn package(&self, reply: Vec<u8>) -> Vec<Step> {
        let mut bytes = self.faults.garbage_prefix.clone();
        bytes.extend_from_slice(&reply);
        chunked(bytes, self.faults.chunk_size)
    }
}

fn chunked(bytes: Vec<u8>, chunk_size: Option<usize>) -> Vec<Step> {
    match chunk_size {
        Some(size) if size > 0 => bytes.chunks(size).map(|c| Step::Data(c.to_vec())).collect(),
        _ => vec![Step::Data(bytes)],
    }
}

/// One open link to the simulated logger
///
/// Replies become readable on the first read after the command, so the
/// input clear that follows every write does not discard them.
pub struct DemoLink {
    device: Rc<RefCell<DeviceState>>,
    speed: LinkSpeed,
    in_flight: VecDeque<Step>,
    rx: VecDeque<Step>,
}

impl Read for DemoLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx.is_empty() {
            self.rx.append(&mut self.in_flight);
        }
        match self.rx.pop_front() {
            Some(Step::Data(chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.rx.push_front(Step::Data(chunk[n..].to_vec()));
                }
                Ok(n)
            }
            Some(Step::Gap) | None => Err(io::Error::new(ErrorKind::TimedOut, "demo: no data")),
        }
    }
}

impl Write for DemoLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let reply = self.device.borrow_mut().handle(buf, self.speed);
        self.in_flight.extend(reply);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for DemoLink {
    fn set_speed(&mut self, speed: LinkSpeed) -> io::Result<()> {
        self.speed = speed;
        self.rx.clear();
        Ok(())
    }

    fn speed(&self) -> LinkSpeed {
        self.speed
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }
}

/// Opens links to one shared simulated logger
#[derive(Clone)]
pub struct DemoOpener {
    device: Rc<RefCell<DeviceState>>,
}

impl DemoOpener {
    /// A logger holding `points`, at power-up speed
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self::with_faults(points, DemoFaults::default())
    }

    /// A logger holding `points` that misbehaves as `faults` describes
    pub fn with_faults(points: Vec<GeoPoint>, faults: DemoFaults) -> Self {
        Self {
            device: Rc::new(RefCell::new(DeviceState {
                speed: LinkSpeed::Low,
                sample_rate: DEFAULT_DEMO_SAMPLE_RATE,
                points,
                faults,
                phase_two_failures: 0,
                stats: DemoStats::default(),
            })),
        }
    }

    /// A logger holding a reproducible random track of `count` points
    pub fn random(seed: u64, count: usize) -> Self {
        Self::new(random_track(seed, count, DEFAULT_DEMO_SAMPLE_RATE))
    }

    /// Counters of what the simulated logger has seen
    pub fn stats(&self) -> DemoStats {
        self.device.borrow().stats
    }

    /// Points currently stored on the simulated logger
    pub fn points(&self) -> Vec<GeoPoint> {
        self.device.borrow().points.clone()
    }

    /// Sampling interval the simulated logger holds
    pub fn sample_rate(&self) -> u32 {
        self.device.borrow().sample_rate
    }

    /// Speed the simulated logger is listening at
    pub fn device_speed(&self) -> LinkSpeed {
        self.device.borrow().speed
    }

    /// Replace the injected faults, keeping stored data
    pub fn set_faults(&self, faults: DemoFaults) {
        let mut device = self.device.borrow_mut();
        device.faults = faults;
        device.phase_two_failures = 0;
    }
}

impl LinkOpener for DemoOpener {
    type Link = DemoLink;

    fn open(&mut self) -> Result<DemoLink, ProtocolError> {
        let mut device = self.device.borrow_mut();
        if device.faults.fail_open {
            return Err(ProtocolError::SerialError("demo: device unavailable".into()));
        }
        device.stats.opens += 1;
        Ok(DemoLink {
            device: Rc::clone(&self.device),
            speed: LinkSpeed::Low,
            in_flight: VecDeque::new(),
            rx: VecDeque::new(),
        })
    }
}

/// Random walk around a fixed start, one point every `sample_rate` seconds
pub fn random_track(seed: u64, count: usize, sample_rate: u32) -> Vec<GeoPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let Some(start) = NaiveDate::from_ymd_opt(2012, 6, 15).and_then(|d| d.and_hms_opt(12, 0, 0))
    else {
        return Vec::new();
    };

    let mut longitude = 24.945831;
    let mut latitude = 60.192059;
    let mut height: f64 = 20.0;

    (0..count)
        .map(|i| {
            longitude += rng.gen_range(-0.0005..0.0005);
            latitude += rng.gen_range(-0.0003..0.0003);
            height = (height + rng.gen_range(-2.0..2.0)).clamp(0.0, 500.0);

            let time = start + Duration::seconds(i as i64 * i64::from(sample_rate.max(1)));
            let point = GeoPoint {
                longitude,
                latitude,
                height,
                timestamp: timestamp_from(time),
            };
            // Keep only what a record can carry
            decode_record(&encode_record(&point))
        })
        .collect()
}

fn timestamp_from(time: NaiveDateTime) -> Timestamp {
    Timestamp {
        second: time.second() as u8,
        minute: time.minute() as u8,
        hour: time.hour() as u8,
        day: time.day() as u8,
        month: time.month() as u8,
        year: time.year() as u16,
    }
}
