//! Protocol commands
//!
//! The logger's simple request/response commands. Each sends a fixed
//! template and validates the answer against its response template.

use super::framing::FrameEnd;
use super::messages::{
    self, CLEAR, QUERY_SAMPLING, QUERY_SAMPLING_RESPONSE, RESET, RESET_RESPONSE,
    RESET_RESPONSE_LEN, RESPONSE_PREFIX_LEN, SET_SAMPLING_RESPONSE, SET_SAMPLING_RESPONSE_LEN,
};
use super::stream::{Link, LinkSpeed};
use super::transport::Transport;
use super::validate::expect;
use super::ProtocolError;
use crate::logging::{LEVEL_CALLS, LEVEL_DETAIL};

/// Simple commands over a borrowed transport
pub struct CommandProtocol<'t, L: Link> {
    transport: &'t mut Transport<L>,
}

impl<'t, L: Link> CommandProtocol<'t, L> {
    /// Borrow `transport` for a command exchange
    pub fn new(transport: &'t mut Transport<L>) -> Self {
        Self { transport }
    }

    /// Send the reset command and validate its echo
    ///
    /// The device takes the reset at high speed and answers before it drops
    /// back to its power-up speed, so the link ends at low speed whatever
    /// the outcome.
    pub fn reset(&mut self) -> Result<(), ProtocolError> {
        if self.transport.log().enabled(LEVEL_CALLS) {
            tracing::debug!("CALL: sending reset to device");
        }

        self.transport.set_speed(LinkSpeed::High)?;
        self.transport.write(RESET.bytes)?;
        let response = self
            .transport
            .read_response(FrameEnd::Exact(RESET_RESPONSE_LEN), RESET.name);
        self.transport.set_speed(LinkSpeed::Low)?;

        let log = *self.transport.log();
        expect(&response?, &RESET_RESPONSE, RESET_RESPONSE_LEN, &log)
    }

    /// Ask the device for its sampling interval in seconds
    pub fn query_sampling(&mut self) -> Result<u32, ProtocolError> {
        if self.transport.log().enabled(LEVEL_CALLS) {
            tracing::debug!("CALL: query for sample rate");
        }

        self.transport.write(QUERY_SAMPLING.bytes)?;
        let response = self
            .transport
            .read_response(FrameEnd::Terminator, QUERY_SAMPLING.name)?;
        let log = *self.transport.log();
        expect(&response, &QUERY_SAMPLING_RESPONSE, RESPONSE_PREFIX_LEN, &log)?;

        let rate = parse_sample_rate(&response)?;
        if log.enabled(LEVEL_DETAIL) {
            tracing::debug!("device sample rate is {}", rate);
        }
        Ok(rate)
    }

    /// Set the sampling interval; `rate` must be in 0..=99
    ///
    /// An out-of-range rate is rejected before anything is sent.
    pub fn set_sampling(&mut self, rate: u32) -> Result<(), ProtocolError> {
        if self.transport.log().enabled(LEVEL_CALLS) {
            tracing::debug!("CALL: set sample rate to {}", rate);
        }

        let message = messages::sample_set_message(rate)?;
        self.transport.write(&message)?;
        let response = self.transport.read_response(
            FrameEnd::Exact(SET_SAMPLING_RESPONSE_LEN),
            SET_SAMPLING_RESPONSE.name,
        )?;
        let log = *self.transport.log();
        expect(&response, &SET_SAMPLING_RESPONSE, RESPONSE_PREFIX_LEN, &log)
    }

    /// Erase all stored points; the device does not answer
    pub fn clear(&mut self) -> Result<(), ProtocolError> {
        if self.transport.log().enabled(LEVEL_CALLS) {
            tracing::debug!("CALL: clear data points");
        }
        self.transport.write(CLEAR.bytes)
    }
}

/// Decimal digits between the 3-byte prefix and the first `,`
pub fn parse_sample_rate(response: &[u8]) -> Result<u32, ProtocolError> {
    let body = response.get(RESPONSE_PREFIX_LEN..).unwrap_or_default();
    let comma = body
        .iter()
        .position(|&b| b == b',')
        .ok_or_else(|| ProtocolError::ParseError("cannot find ',' after sample rate".into()))?;
    parse_decimal(&body[..comma], "sample rate")
}

/// Strict ASCII decimal field (surrounding spaces allowed)
pub(crate) fn parse_decimal(field: &[u8], what: &str) -> Result<u32, ProtocolError> {
    let text = std::str::from_utf8(field)
        .map_err(|_| ProtocolError::ParseError(format!("{} is not ASCII", what)))?
        .trim();
    text.parse::<u32>()
        .map_err(|_| ProtocolError::ParseError(format!("invalid {}: {:?}", what, text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use crate::protocol::transport::tests::ScriptedLink;

    fn transport_with(chunks: &[&[u8]]) -> Transport<ScriptedLink> {
        Transport::new(ScriptedLink::with_chunks(chunks), LogConfig::new(5))
    }

    #[test]
    fn test_reset_ok_ends_at_low_speed() {
        let mut transport = transport_with(&[b"\x00\x00##\xf0RS\r\n"]);
        CommandProtocol::new(&mut transport).reset().unwrap();

        assert_eq!(transport.link().writes, RESET.bytes);
        assert_eq!(transport.speed(), LinkSpeed::Low);
    }

    #[test]
    fn test_reset_timeout_still_returns_to_low_speed() {
        let mut transport = transport_with(&[]);
        let err = CommandProtocol::new(&mut transport).reset().unwrap_err();

        assert!(matches!(err, ProtocolError::Timeout("reset")));
        assert_eq!(transport.speed(), LinkSpeed::Low);
    }

    #[test]
    fn test_reset_mismatch() {
        let mut transport = transport_with(&[b"##\xf0XX\r\n"]);
        let err = CommandProtocol::new(&mut transport).reset().unwrap_err();
        assert!(err.is_protocol_level());
    }

    #[test]
    fn test_query_sampling() {
        let mut transport = transport_with(&[b"##\xf3", b"15,0*\r\n"]);
        let rate = CommandProtocol::new(&mut transport).query_sampling().unwrap();
        assert_eq!(rate, 15);
    }

    #[test]
    fn test_query_sampling_without_delimiter() {
        let mut transport = transport_with(&[b"##\xf315\r\n"]);
        let err = CommandProtocol::new(&mut transport)
            .query_sampling()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ParseError(_)));
    }

    #[test]
    fn test_set_sampling_sends_digits() {
        let mut transport = transport_with(&[b"##\xf407\r\n"]);
        CommandProtocol::new(&mut transport).set_sampling(7).unwrap();
        assert_eq!(&transport.link().writes[3..5], b"07");
    }

    #[test]
    fn test_set_sampling_rejects_before_send() {
        let mut transport = transport_with(&[]);
        let err = CommandProtocol::new(&mut transport)
            .set_sampling(100)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSampleRate(100)));
        assert!(transport.link().writes.is_empty());
    }

    #[test]
    fn test_clear_writes_only() {
        let mut transport = transport_with(&[]);
        CommandProtocol::new(&mut transport).clear().unwrap();
        assert_eq!(transport.link().writes, CLEAR.bytes);
    }

    #[test]
    fn test_parse_sample_rate() {
        assert_eq!(parse_sample_rate(b"##\xf305,0*\r\n").unwrap(), 5);
        assert_eq!(parse_sample_rate(b"##\xf3 42,\r\n").unwrap(), 42);
        assert!(parse_sample_rate(b"##\xf3,\r\n").is_err());
        assert!(parse_sample_rate(b"##\xf3x1,\r\n").is_err());
        assert!(parse_sample_rate(b"##").is_err());
    }
}
