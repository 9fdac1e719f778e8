//! # geologger Core Library
//!
//! Serial protocol engine for dedicated GPS track logger devices.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Framed serial reads with start-marker resynchronisation
//! - Baud-rate negotiation with reset fallback
//! - The fixed command set (reset, query/set sampling, clear)
//! - Bulk track download with per-record checksums
//! - GPX and JSON export of downloaded tracks
//! - A simulated logger for demo mode and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use geologger_core::{config::SessionConfig, protocol::SerialOpener, session};
//!
//! let config = SessionConfig::for_device("/dev/ttyUSB0");
//! let mut opener = SerialOpener::new(&config);
//!
//! let output = session::run(&mut opener, &config, session::Operation::Download)?;
//! if let session::OperationOutput::Downloaded(track) = output {
//!     geologger_core::track::write_track_file(&track, "track.gpx")?;
//! }
//! ```

pub mod config;
pub mod demo;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod track;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::demo::{DemoFaults, DemoOpener};
    pub use crate::logging::LogConfig;
    pub use crate::protocol::{Link, LinkOpener, LinkSpeed, ProtocolError, SerialOpener};
    pub use crate::session::{Operation, OperationOutput, Session};
    pub use crate::track::{GeoPoint, PointCollection, Timestamp};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
