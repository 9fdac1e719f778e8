//! Protocol errors

use thiserror::Error;

/// Errors that can occur during logger communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Opening or configuring the port failed
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Read or write on an open link failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// No complete response within the allowed polls
    #[error("Timed out waiting for {0} response")]
    Timeout(&'static str),

    #[error("Unexpected {command} response: {detail}")]
    /// Response did not match its template
    ResponseMismatch {
        /// Template name
        command: &'static str,
        /// First divergence
        detail: String,
    },

    #[error("Checksum mismatch on point {index}: expected {expected:#04x}, got {actual:#04x}")]
    /// Record checksum failed
    ChecksumMismatch {
        /// Point index
        index: usize,
        /// Checksum computed over the record
        expected: u8,
        /// Checksum byte received
        actual: u8,
    },

    /// Numeric field could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Rate does not fit the two digit field
    #[error("Sample rate {0} is out of range (0..=99)")]
    InvalidSampleRate(u32),

    /// Every negotiation attempt failed
    #[error("Device did not reach high speed after {0} attempts")]
    NegotiationFailed(usize),
}

impl ProtocolError {
    /// I/O-level failure of the link itself; never retried
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, ProtocolError::SerialError(_) | ProtocolError::IoError(_))
    }

    /// Failures the speed negotiator answers with a reset
    pub fn is_protocol_level(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout(_) | ProtocolError::ResponseMismatch { .. }
        )
    }
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        ProtocolError::SerialError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let io = ProtocolError::from(std::io::Error::new(std::io::ErrorKind::Other, "gone"));
        assert!(io.is_transport_fault());
        assert!(!io.is_protocol_level());

        let timeout = ProtocolError::Timeout("reset");
        assert!(timeout.is_protocol_level());
        assert!(!timeout.is_transport_fault());

        let checksum = ProtocolError::ChecksumMismatch {
            index: 3,
            expected: 0x10,
            actual: 0x11,
        };
        assert!(!checksum.is_protocol_level());
        assert!(!checksum.is_transport_fault());
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::ChecksumMismatch {
            index: 7,
            expected: 0xba,
            actual: 0x01,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch on point 7: expected 0xba, got 0x01"
        );
        assert_eq!(
            ProtocolError::InvalidSampleRate(100).to_string(),
            "Sample rate 100 is out of range (0..=99)"
        );
    }
}
