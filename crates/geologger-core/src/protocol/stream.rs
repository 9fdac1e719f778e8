//! Link abstraction
//!
//! The byte link to the logger and the opener that produces a fresh one
//! for every negotiation attempt. [`SerialLink`] backs both with a real
//! serial port.

use serialport::SerialPort;
use std::io::{self, Read, Write};

use super::ProtocolError;

/// The two line speeds the logger understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkSpeed {
    /// Power-up speed, used for negotiation and after reset
    Low,
    /// Operating speed after negotiation
    High,
}

/// Abstraction over the byte link to the logger
///
/// Reads must wait at most one poll interval and report an empty wait as
/// `ErrorKind::TimedOut`.
pub trait Link: Read + Write {
    /// Reconfigure the line speed
    fn set_speed(&mut self, speed: LinkSpeed) -> io::Result<()>;

    /// Currently configured line speed
    fn speed(&self) -> LinkSpeed;

    /// Discard received but unread input
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Opens a fresh link at low speed; dropping the link closes it
pub trait LinkOpener {
    /// Link type produced by this opener
    type Link: Link;

    /// Open the link at [`LinkSpeed::Low`]
    fn open(&mut self) -> Result<Self::Link, ProtocolError>;
}

/// Serial port wrapper implementing Link
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    speed: LinkSpeed,
    low_baud: u32,
    high_baud: u32,
}

impl SerialLink {
    /// Wrap a port that is currently configured at `low_baud`
    pub fn new(port: Box<dyn SerialPort>, low_baud: u32, high_baud: u32) -> Self {
        Self {
            port,
            speed: LinkSpeed::Low,
            low_baud,
            high_baud,
        }
    }

    /// Baud rate for a given speed on this link
    pub fn baud_for(&self, speed: LinkSpeed) -> u32 {
        match speed {
            LinkSpeed::Low => self.low_baud,
            LinkSpeed::High => self.high_baud,
        }
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Link for SerialLink {
    fn set_speed(&mut self, speed: LinkSpeed) -> io::Result<()> {
        let baud = self.baud_for(speed);
        tracing::debug!("set serial device baud {}", baud);
        self.port
            .set_baud_rate(baud)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        // Anything buffered was received at the old rate
        self.clear_input_buffer()?;
        self.speed = speed;
        Ok(())
    }

    fn speed(&self) -> LinkSpeed {
        self.speed
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
