//! Serial Protocol Communication
//!
//! Implements the logger's fixed-template serial protocol.
//!
//! Every device response starts with the `##` marker; commands are fixed
//! byte templates, and track points are fetched one 20-byte record at a time.

pub mod commands;
pub mod download;
mod error;
pub mod framing;
pub mod messages;
pub mod negotiate;
pub mod record;
pub mod serial;
pub mod stream;
pub mod transport;
pub mod validate;

pub use commands::CommandProtocol;
pub use download::{parse_point_count, DownloadProtocol};
pub use error::ProtocolError;
pub use framing::{FrameAccumulator, FrameEnd, ReadOutcome};
pub use messages::ProtocolMessage;
pub use negotiate::{Negotiated, NegotiationState, SpeedNegotiator};
pub use serial::{open_port, SerialOpener};
pub use stream::{Link, LinkOpener, LinkSpeed, SerialLink};
pub use transport::{Poll, Transport};

/// Baud rate the device uses after power-up or reset
pub const LOW_SPEED_BAUD: u32 = 9600;

/// Baud rate after a successful speed negotiation
pub const HIGH_SPEED_BAUD: u32 = 115200;

/// Bounded wait per read poll in milliseconds
pub const POLL_INTERVAL_MS: u64 = 100;

/// Pause after opening the port, before the first command
pub const SETTLE_DELAY_MS: u64 = 1000;

/// Pause after switching to high speed so the device can retune
pub const RETUNE_DELAY_MS: u64 = 100;

/// Speed negotiation attempts before giving up
pub const NEGOTIATION_ATTEMPTS: usize = 5;

/// Read polls allowed per downloaded record
pub const POINT_READ_ATTEMPTS: usize = 10;

/// Largest frame the reader will accumulate
pub const FRAME_BUFFER_SIZE: usize = 1024;
