//! Logger sessions
//!
//! A session owns the link from negotiation to the closing reset. Exactly
//! one operation runs per session; the link is closed when the session is
//! dropped, whichever way it ends.

use crate::config::SessionConfig;
use crate::logging::LEVEL_CALLS;
use crate::protocol::messages::MAX_SAMPLE_RATE;
use crate::protocol::{
    CommandProtocol, DownloadProtocol, Link, LinkOpener, ProtocolError, SpeedNegotiator,
    Transport,
};
use crate::track::PointCollection;

/// One user-level operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Reset the device without negotiating
    Reset,
    /// Read the sampling interval
    QuerySampling,
    /// Set the sampling interval (0..=99 seconds)
    SetSampling(u32),
    /// Download every stored point
    Download,
    /// Erase every stored point
    Clear,
}

impl Operation {
    /// Reject arguments the device cannot take, before any link is opened
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match *self {
            Operation::SetSampling(rate) if rate > MAX_SAMPLE_RATE => {
                Err(ProtocolError::InvalidSampleRate(rate))
            }
            _ => Ok(()),
        }
    }
}

/// What a completed operation produced
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    /// Device is back at power-up speed
    Reset,
    /// Current sampling interval in seconds
    SampleRate(u32),
    /// The interval now in effect
    SampleRateSet(u32),
    /// Every stored point, in index order
    Downloaded(PointCollection),
    /// Stored points erased
    Cleared,
}

/// A negotiated, high-speed session with the logger
pub struct Session<L: Link> {
    transport: Transport<L>,
    point_read_attempts: usize,
}

impl<L: Link> Session<L> {
    /// Open and negotiate a link through `opener`
    pub fn establish<O>(opener: &mut O, config: &SessionConfig) -> Result<Self, ProtocolError>
    where
        O: LinkOpener<Link = L>,
    {
        let negotiated = SpeedNegotiator::new(opener, config).negotiate()?;
        if config.log.enabled(LEVEL_CALLS) {
            tracing::debug!("session ready after {} attempt(s)", negotiated.attempts);
        }
        Ok(Self {
            transport: negotiated.transport,
            point_read_attempts: config.point_read_attempts,
        })
    }

    /// The negotiated transport
    pub fn transport(&self) -> &Transport<L> {
        &self.transport
    }

    /// Sampling interval in seconds
    pub fn query_sampling(&mut self) -> Result<u32, ProtocolError> {
        CommandProtocol::new(&mut self.transport).query_sampling()
    }

    /// Change the sampling interval
    pub fn set_sampling(&mut self, rate: u32) -> Result<(), ProtocolError> {
        CommandProtocol::new(&mut self.transport).set_sampling(rate)
    }

    /// Erase all stored points
    pub fn clear(&mut self) -> Result<(), ProtocolError> {
        CommandProtocol::new(&mut self.transport).clear()
    }

    /// Fetch every stored point
    pub fn download(&mut self) -> Result<PointCollection, ProtocolError> {
        self.download_with_progress(|_, _| {})
    }

    /// Fetch every stored point, reporting `(done, total)` after each
    pub fn download_with_progress(
        &mut self,
        progress: impl FnMut(usize, usize),
    ) -> Result<PointCollection, ProtocolError> {
        DownloadProtocol::new(&mut self.transport)
            .with_read_attempts(self.point_read_attempts)
            .download_with_progress(progress)
    }

    /// Run one operation on this session
    pub fn perform(&mut self, operation: Operation) -> Result<OperationOutput, ProtocolError> {
        match operation {
            Operation::Reset => {
                CommandProtocol::new(&mut self.transport).reset()?;
                Ok(OperationOutput::Reset)
            }
            Operation::QuerySampling => self.query_sampling().map(OperationOutput::SampleRate),
            Operation::SetSampling(rate) => {
                self.set_sampling(rate)?;
                Ok(OperationOutput::SampleRateSet(rate))
            }
            Operation::Download => self.download().map(OperationOutput::Downloaded),
            Operation::Clear => {
                self.clear()?;
                Ok(OperationOutput::Cleared)
            }
        }
    }

    /// Reset the device back to low speed and close the link
    ///
    /// A failed reset is only reported; the device drops back to low speed
    /// on its next power cycle anyway.
    pub fn close(mut self) {
        if let Err(e) = CommandProtocol::new(&mut self.transport).reset() {
            tracing::warn!("final reset failed: {}", e);
        }
        let (tx, rx) = self.transport.counters();
        tracing::debug!("session closed, {} bytes sent, {} received", tx, rx);
    }
}

/// Reset the device over a fresh low-speed link, without negotiating
pub fn reset_device<O: LinkOpener>(
    opener: &mut O,
    config: &SessionConfig,
) -> Result<(), ProtocolError> {
    let mut transport = Transport::new(opener.open()?, config.log);
    std::thread::sleep(config.settle_delay());
    CommandProtocol::new(&mut transport).reset()
}

/// Run one operation end to end
///
/// Everything except a plain reset negotiates first and resets the device
/// afterwards. Arguments are checked before the link is opened.
pub fn run<O: LinkOpener>(
    opener: &mut O,
    config: &SessionConfig,
    operation: Operation,
) -> Result<OperationOutput, ProtocolError> {
    operation.validate()?;

    if operation == Operation::Reset {
        reset_device(opener, config)?;
        return Ok(OperationOutput::Reset);
    }

    let mut session = Session::establish(opener, config)?;
    let result = session.perform(operation);

    match &result {
        // The link is gone; dropping the session closes what is left
        Err(e) if e.is_transport_fault() => drop(session),
        _ => session.close(),
    }
    result
}
