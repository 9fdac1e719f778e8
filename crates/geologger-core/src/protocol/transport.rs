//! Raw byte transport
//!
//! Whole-message writes and the bounded-wait read primitive everything
//! else is built on.

use std::io::ErrorKind;

use super::stream::{Link, LinkSpeed};
use super::ProtocolError;
use crate::logging::LogConfig;

/// Result of one bounded wait on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// This many bytes were placed at the start of the buffer
    Data(usize),
    /// Nothing arrived within the poll interval
    Timeout,
}

/// Owns the link for the lifetime of a session
pub struct Transport<L: Link> {
    link: L,
    pub(crate) log: LogConfig,
    tx_bytes: u64,
    rx_bytes: u64,
}

impl<L: Link> Transport<L> {
    /// Wrap an open link with zeroed counters
    pub fn new(link: L, log: LogConfig) -> Self {
        Self {
            link,
            log,
            tx_bytes: 0,
            rx_bytes: 0,
        }
    }

    /// The underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// The underlying link, mutably
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Give the link back; dropping it closes the port
    pub fn into_link(self) -> L {
        self.link
    }

    /// Verbosity shared with the layers above
    pub fn log(&self) -> &LogConfig {
        &self.log
    }

    /// (tx bytes, rx bytes) since the transport was created
    pub fn counters(&self) -> (u64, u64) {
        (self.tx_bytes, self.rx_bytes)
    }

    /// Current line speed
    pub fn speed(&self) -> LinkSpeed {
        self.link.speed()
    }

    /// Reconfigure the line speed; failure is a transport fault
    pub fn set_speed(&mut self, speed: LinkSpeed) -> Result<(), ProtocolError> {
        self.link.set_speed(speed)?;
        Ok(())
    }

    /// Write all of `message`, then drop any stale input
    ///
    /// Interrupted writes are retried; every other failure, including a link
    /// that accepts zero bytes, is a transport fault.
    pub fn write(&mut self, message: &[u8]) -> Result<(), ProtocolError> {
        self.log.dump("send", message);

        let mut written = 0;
        while written < message.len() {
            match self.link.write(&message[written..]) {
                Ok(0) => {
                    return Err(ProtocolError::SerialError(format!(
                        "link accepted no bytes after {} of {}",
                        written,
                        message.len()
                    )));
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {
                    tracing::trace!("write interrupted, retrying");
                    continue;
                }
                Err(e) => {
                    tracing::error!("error writing to serial port: {}", e);
                    return Err(e.into());
                }
            }
        }
        self.link.flush()?;
        self.tx_bytes = self.tx_bytes.saturating_add(written as u64);

        // Bytes received before the command cannot belong to its answer
        self.link.clear_input_buffer()?;
        Ok(())
    }

    /// Wait up to one poll interval for data
    ///
    /// An interrupted wait is retried. End of stream is a transport fault,
    /// since the wait only returns early when data is pending.
    pub fn poll(&mut self, buf: &mut [u8]) -> Result<Poll, ProtocolError> {
        loop {
            match self.link.read(buf) {
                Ok(0) => {
                    return Err(ProtocolError::SerialError(
                        "serial link closed while reading".into(),
                    ));
                }
                Ok(n) => {
                    self.rx_bytes = self.rx_bytes.saturating_add(n as u64);
                    return Ok(Poll::Data(n));
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e)
                    if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock =>
                {
                    return Ok(Poll::Timeout);
                }
                Err(e) => {
                    tracing::error!("serial is failing: {}", e);
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    /// Scripted link: each read pops one step
    pub(crate) struct ScriptedLink {
        pub reads: VecDeque<io::Result<Vec<u8>>>,
        pub writes: Vec<u8>,
        pub write_steps: VecDeque<io::Result<usize>>,
        pub clears: usize,
        pub speed: LinkSpeed,
    }

    impl ScriptedLink {
        pub fn new() -> Self {
            Self {
                reads: VecDeque::new(),
                writes: Vec::new(),
                write_steps: VecDeque::new(),
                clears: 0,
                speed: LinkSpeed::Low,
            }
        }

        pub fn with_chunks(chunks: &[&[u8]]) -> Self {
            let mut link = Self::new();
            for chunk in chunks {
                link.reads.push_back(Ok(chunk.to_vec()));
            }
            link
        }

        pub fn timeout(&mut self) {
            self.reads
                .push_back(Err(io::Error::new(ErrorKind::TimedOut, "timed out")));
        }
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.reads.push_front(Ok(chunk[n..].to_vec()));
                    }
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
            }
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.write_steps.pop_front() {
                Some(Ok(limit)) => {
                    let n = limit.min(buf.len());
                    self.writes.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => {
                    self.writes.extend_from_slice(buf);
                    Ok(buf.len())
                }
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Link for ScriptedLink {
        fn set_speed(&mut self, speed: LinkSpeed) -> io::Result<()> {
            self.speed = speed;
            Ok(())
        }

        fn speed(&self) -> LinkSpeed {
            self.speed
        }

        fn clear_input_buffer(&mut self) -> io::Result<()> {
            self.clears += 1;
            Ok(())
        }
    }

    #[test]
    fn test_write_retries_interrupt_and_partial_writes() {
        let mut link = ScriptedLink::new();
        link.write_steps
            .push_back(Err(io::Error::new(ErrorKind::Interrupted, "EINTR")));
        link.write_steps.push_back(Ok(3));
        let mut transport = Transport::new(link, LogConfig::default());

        transport.write(b"##\xf0RS\r\n").unwrap();

        assert_eq!(transport.link().writes, b"##\xf0RS\r\n");
        assert_eq!(transport.link().clears, 1);
        assert_eq!(transport.counters(), (7, 0));
    }

    #[test]
    fn test_write_zero_is_transport_fault() {
        let mut link = ScriptedLink::new();
        link.write_steps.push_back(Ok(0));
        let mut transport = Transport::new(link, LogConfig::default());

        let err = transport.write(b"abc").unwrap_err();
        assert!(err.is_transport_fault());
        assert_eq!(transport.link().clears, 0);
    }

    #[test]
    fn test_write_error_is_transport_fault() {
        let mut link = ScriptedLink::new();
        link.write_steps
            .push_back(Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged")));
        let mut transport = Transport::new(link, LogConfig::default());

        assert!(transport.write(b"abc").unwrap_err().is_transport_fault());
    }

    #[test]
    fn test_poll_outcomes() {
        let mut link = ScriptedLink::with_chunks(&[b"##"]);
        link.reads
            .push_back(Err(io::Error::new(ErrorKind::Interrupted, "EINTR")));
        link.reads.push_back(Ok(b"x".to_vec()));
        link.timeout();
        link.reads
            .push_back(Err(io::Error::new(ErrorKind::Other, "device lost")));
        let mut transport = Transport::new(link, LogConfig::default());
        let mut buf = [0u8; 16];

        assert_eq!(transport.poll(&mut buf).unwrap(), Poll::Data(2));
        assert_eq!(transport.poll(&mut buf).unwrap(), Poll::Data(1));
        assert_eq!(transport.poll(&mut buf).unwrap(), Poll::Timeout);
        assert!(transport.poll(&mut buf).unwrap_err().is_transport_fault());
    }

    #[test]
    fn test_poll_end_of_stream_is_fault() {
        let link = ScriptedLink::with_chunks(&[b""]);
        let mut transport = Transport::new(link, LogConfig::default());
        let mut buf = [0u8; 4];
        assert!(transport.poll(&mut buf).unwrap_err().is_transport_fault());
    }
}
