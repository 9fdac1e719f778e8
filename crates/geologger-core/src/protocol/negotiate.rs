//! Baud-rate negotiation
//!
//! The logger powers up at low speed. A two-phase exchange moves both ends
//! to high speed; when the device does not answer as expected it is reset
//! back to low speed and the exchange is tried again. Every attempt starts
//! from a freshly opened link.

use std::thread;

use super::commands::CommandProtocol;
use super::framing::FrameEnd;
use super::messages::{
    SPEED_PHASE_ONE, SPEED_PHASE_ONE_RESPONSE, SPEED_PHASE_ONE_RESPONSE_LEN, SPEED_PHASE_TWO,
    SPEED_PHASE_TWO_RESPONSE, SPEED_PHASE_TWO_RESPONSE_LEN,
};
use super::stream::{Link, LinkOpener, LinkSpeed};
use super::transport::Transport;
use super::validate::expect;
use super::ProtocolError;
use crate::config::SessionConfig;
use crate::logging::{LEVEL_CALLS, LEVEL_DETAIL};

/// What the next negotiation attempt does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Run the two-phase speed exchange
    TryHighSpeed,
    /// Reset the device back to its power-up speed
    DoReset,
}

/// A link running at high speed, ready for commands
pub struct Negotiated<L: Link> {
    /// Transport left at high speed
    pub transport: Transport<L>,
    /// Attempts used, including the successful one
    pub attempts: usize,
}

/// Drives the TryHighSpeed / DoReset state machine
pub struct SpeedNegotiator<'a, O: LinkOpener> {
    opener: &'a mut O,
    config: &'a SessionConfig,
    state: NegotiationState,
}

impl<'a, O: LinkOpener> SpeedNegotiator<'a, O> {
    /// Start in [`NegotiationState::TryHighSpeed`]
    pub fn new(opener: &'a mut O, config: &'a SessionConfig) -> Self {
        Self {
            opener,
            config,
            state: NegotiationState::TryHighSpeed,
        }
    }

    /// State the next attempt will run
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Negotiate high speed within the configured attempt ceiling
    ///
    /// Timeouts and unexpected answers move the state machine on; a
    /// transport fault ends negotiation immediately.
    pub fn negotiate(mut self) -> Result<Negotiated<O::Link>, ProtocolError> {
        let log = self.config.log;
        let attempts = self.config.negotiation_attempts;

        for attempt in 1..=attempts {
            if log.enabled(LEVEL_CALLS) {
                tracing::info!(
                    "negotiation attempt {} of {}: {:?}",
                    attempt,
                    attempts,
                    self.state
                );
            }

            let mut transport = Transport::new(self.opener.open()?, log);
            thread::sleep(self.config.settle_delay());

            match self.state {
                NegotiationState::TryHighSpeed => match self.try_high_speed(&mut transport) {
                    Ok(()) => {
                        if log.enabled(LEVEL_CALLS) {
                            tracing::info!("high speed link established");
                        }
                        return Ok(Negotiated {
                            transport,
                            attempts: attempt,
                        });
                    }
                    Err(e) if e.is_protocol_level() => {
                        tracing::warn!("speed change failed: {}", e);
                        self.state = NegotiationState::DoReset;
                    }
                    Err(e) => return Err(e),
                },
                NegotiationState::DoReset => {
                    match CommandProtocol::new(&mut transport).reset() {
                        Ok(()) => {
                            if log.enabled(LEVEL_DETAIL) {
                                tracing::debug!("device reset, retrying speed change");
                            }
                            self.state = NegotiationState::TryHighSpeed;
                        }
                        Err(e) if e.is_protocol_level() => {
                            tracing::warn!("reset failed: {}", e);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            // The link closes here; the next attempt reopens it
        }

        tracing::error!("failed to set high speed after {} attempts", attempts);
        Err(ProtocolError::NegotiationFailed(attempts))
    }

    fn try_high_speed(&self, transport: &mut Transport<O::Link>) -> Result<(), ProtocolError> {
        let log = *transport.log();

        transport.write(SPEED_PHASE_ONE.bytes)?;
        let response = transport.read_response(
            FrameEnd::Exact(SPEED_PHASE_ONE_RESPONSE_LEN),
            SPEED_PHASE_ONE.name,
        )?;
        expect(
            &response,
            &SPEED_PHASE_ONE_RESPONSE,
            SPEED_PHASE_ONE_RESPONSE_LEN,
            &log,
        )?;

        transport.set_speed(LinkSpeed::High)?;
        thread::sleep(self.config.retune_delay());

        transport.write(SPEED_PHASE_TWO.bytes)?;
        let response = transport.read_response(
            FrameEnd::Exact(SPEED_PHASE_TWO_RESPONSE_LEN),
            SPEED_PHASE_TWO.name,
        )?;
        expect(
            &response,
            &SPEED_PHASE_TWO_RESPONSE,
            SPEED_PHASE_TWO_RESPONSE_LEN,
            &log,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use crate::protocol::transport::tests::ScriptedLink;
    use std::collections::VecDeque;
    use std::io;

    /// Hands out pre-scripted links, one per open
    struct ScriptedOpener {
        links: VecDeque<ScriptedLink>,
        opened: usize,
    }

    impl ScriptedOpener {
        fn new(links: Vec<ScriptedLink>) -> Self {
            Self {
                links: links.into(),
                opened: 0,
            }
        }
    }

    impl LinkOpener for ScriptedOpener {
        type Link = ScriptedLink;

        fn open(&mut self) -> Result<ScriptedLink, ProtocolError> {
            self.opened += 1;
            self.links.pop_front().ok_or_else(|| {
                ProtocolError::SerialError("no such device".into())
            })
        }
    }

    fn config() -> SessionConfig {
        let mut config = SessionConfig::without_delays();
        config.log = LogConfig::new(5);
        config
    }

    fn good_exchange() -> ScriptedLink {
        ScriptedLink::with_chunks(&[b"##\xf1\x04\x01\r\n", b"##\xf2OK1\r\n"])
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let config = config();
        let mut opener = ScriptedOpener::new(vec![good_exchange()]);

        let negotiated = SpeedNegotiator::new(&mut opener, &config)
            .negotiate()
            .unwrap();

        assert_eq!(negotiated.attempts, 1);
        assert_eq!(negotiated.transport.speed(), LinkSpeed::High);
        let mut sent = SPEED_PHASE_ONE.bytes.to_vec();
        sent.extend_from_slice(SPEED_PHASE_TWO.bytes);
        assert_eq!(negotiated.transport.link().writes, sent);
    }

    #[test]
    fn test_reset_fallback_then_success() {
        let config = config();
        let mut opener = ScriptedOpener::new(vec![
            // Phase 2 answers garbage
            ScriptedLink::with_chunks(&[b"##\xf1\x04\x01\r\n", b"##\xf2NO1\r\n"]),
            ScriptedLink::with_chunks(&[b"##\xf0RS\r\n"]),
            good_exchange(),
        ]);

        let negotiated = SpeedNegotiator::new(&mut opener, &config)
            .negotiate()
            .unwrap();
        assert_eq!(negotiated.attempts, 3);
        assert_eq!(opener.opened, 3);
    }

    #[test]
    fn test_failed_reset_stays_in_reset() {
        let config = config();
        let mut opener = ScriptedOpener::new(vec![
            ScriptedLink::new(),
            ScriptedLink::new(),
            ScriptedLink::with_chunks(&[b"##\xf0RS\r\n"]),
            good_exchange(),
        ]);

        let negotiated = SpeedNegotiator::new(&mut opener, &config)
            .negotiate()
            .unwrap();
        assert_eq!(negotiated.attempts, 4);
    }

    #[test]
    fn test_silent_device_exhausts_attempts() {
        let config = config();
        let mut opener = ScriptedOpener::new((0..5).map(|_| ScriptedLink::new()).collect());

        let err = SpeedNegotiator::new(&mut opener, &config)
            .negotiate()
            .err()
            .unwrap();
        assert!(matches!(err, ProtocolError::NegotiationFailed(5)));
        assert_eq!(opener.opened, 5);
    }

    #[test]
    fn test_transport_fault_aborts_immediately() {
        let config = config();
        let mut broken = ScriptedLink::new();
        broken
            .write_steps
            .push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        let mut opener = ScriptedOpener::new(vec![broken, good_exchange()]);

        let err = SpeedNegotiator::new(&mut opener, &config)
            .negotiate()
            .err()
            .unwrap();
        assert!(err.is_transport_fault());
        assert_eq!(opener.opened, 1);
    }

    #[test]
    fn test_open_failure_is_transport_fault() {
        let config = config();
        let mut opener = ScriptedOpener::new(vec![]);

        let err = SpeedNegotiator::new(&mut opener, &config)
            .negotiate()
            .err()
            .unwrap();
        assert!(err.is_transport_fault());
    }
}
