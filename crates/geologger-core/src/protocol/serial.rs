//! Serial port handling
//!
//! Opens and configures the OS serial port the logger is attached to.

use serialport::SerialPort;
use std::time::Duration;

use super::stream::{LinkOpener, SerialLink};
use super::ProtocolError;
use crate::config::SessionConfig;

/// Open a serial port at `baud` with the given per-read timeout
pub fn open_port(
    name: &str,
    baud: u32,
    poll_interval: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let mut port = serialport::new(name, baud)
        .timeout(poll_interval)
        .open()
        .map_err(|e| ProtocolError::SerialError(format!("cannot open {}: {}", name, e)))?;
    configure_port(port.as_mut())?;
    Ok(port)
}

/// 8 data bits, no parity, 1 stop bit, no flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)?;
    port.set_parity(serialport::Parity::None)?;
    port.set_stop_bits(serialport::StopBits::One)?;
    port.set_flow_control(serialport::FlowControl::None)?;
    port.clear(serialport::ClearBuffer::Input)?;
    Ok(())
}

/// Opens the configured device as a [`SerialLink`]
#[derive(Debug, Clone)]
pub struct SerialOpener {
    device: String,
    low_baud: u32,
    high_baud: u32,
    poll_interval: Duration,
}

impl SerialOpener {
    /// Device name and baud rates from the session settings
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            device: config.device.clone(),
            low_baud: config.low_baud,
            high_baud: config.high_baud,
            poll_interval: config.poll_interval(),
        }
    }
}

impl LinkOpener for SerialOpener {
    type Link = SerialLink;

    fn open(&mut self) -> Result<SerialLink, ProtocolError> {
        let port = open_port(&self.device, self.low_baud, self.poll_interval)?;
        tracing::debug!("opened {} at {} baud", self.device, self.low_baud);
        Ok(SerialLink::new(port, self.low_baud, self.high_baud))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_is_transport_fault() {
        let config = SessionConfig::for_device("/dev/geologger-does-not-exist");
        let err = SerialOpener::new(&config).open().err().unwrap();
        assert!(err.is_transport_fault());
    }
}
