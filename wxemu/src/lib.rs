//! wxemu: Emulate your (weather) instruments from within Rust
//!
//! The wxemu library provides the protocol engine that sits behind a serial line and answers like
//! a real meteorological instrument would. Data loggers and AWOS/ASOS software can then be tested
//! against a realistic device without the hardware on the bench. Every emulated instrument family
//! lives in its own crate and implements the [`Protocol`] trait; this crate takes care of the
//! rest:
//!
//! - Checksums and framing: XOR, modulo-256 sum, CRC-16/CCITT in its different conventions, line
//!   and STX/ETX block framing, see [`checksum`] and [`framing`].
//! - Tokenizing: case-insensitive keyword tables that never match a keyword inside a longer one,
//!   see [`tokenizer`].
//! - Dispatching: resolving a request to one or more addressed devices on a multi-drop bus and
//!   building the replies, see [`Dispatcher`] and [`AddressTable`].
//! - Output formatting: a compiler and evaluator for the small format-string language used by
//!   `FORM`-style commands, see [`format`].
//! - Scheduling: one thread that receives and dispatches commands and one thread that sends
//!   measurement data whenever a device is in continuous mode, see [`Emulator`].
//!
//! # Currently implemented transports are:
//! - Serial (blocking) using the [`serialport`] crate, enabled with the `serial` feature.
//! - A single accepted TCP/IP connection, e.g., behind a serial device server.
//! - A loopback transport for testing.
//!
//! # Goals and non-goals of this project
//!
//! wxemu emulates the protocol of an instrument, not its electrical behavior. Timing of
//! RS-485/RS-422/SDI-12 signaling is not emulated and configuration changes made by the host live
//! only as long as the emulator process does.
//!
//! # License
//!
//! Licensed under either of
//!
//! - Apache License, Version 2.0 ([LICENSE-APACHE](http://www.apache.org/licenses/LICENSE-2.0))
//! - MIT license ([LICENSE-MIT](http://opensource.org/licenses/MIT))
//!
//! at your option.
//!
//! # Contribution
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted
//! for inclusion in the work by you, as defined in the Apache-2.0 license, shall be
//! dual licensed as above, without any additional terms or conditions.

#![warn(missing_docs)]

pub mod address;
pub mod checksum;
pub mod config;
pub mod dispatch;
pub mod feed;
pub mod format;
pub mod framing;
pub mod message;
pub mod protocol;
pub mod schedule;
pub mod scheduler;
pub mod tokenizer;
pub mod units;

mod loopback;
#[cfg(feature = "serial")]
mod serial;
mod tcp_ip;
mod transport;

pub use address::AddressTable;
pub use config::{ElectricalMode, EmulatorConfig};
pub use dispatch::{Dispatched, Dispatcher};
pub use feed::{FileFeed, MeasurementFeed, VecFeed};
pub use format::{CompiledFormat, FormatVariable, Value};
pub use framing::Framing;
pub use loopback::LoopbackTransport;
pub use message::ParsedMessage;
pub use protocol::{ChecksumStatus, Device, Outcome, Protocol, Reply, Request, Target};
pub use schedule::{OutputMode, OutputSchedule};
pub use scheduler::{Emulator, EmulatorContext, SchedulerOptions};
#[cfg(feature = "serial")]
pub use serial::SerialPortTransport;
pub use tcp_ip::TcpTransport;
pub use transport::{SerialTransport, StreamTransport};

use std::path::PathBuf;

use thiserror::Error;

/// Errors that a protocol engine reports for a single frame or command.
///
/// None of these are fatal: the emulator logs them, answers with the family's error reply if it
/// defines one, and goes on with the next frame. Every error path leaves the device state
/// consistent.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The frame is missing a delimiter, an address, or a checksum field.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    /// The frame is well formed, but its checksum is missing or does not match.
    #[error("Checksum mismatch: received {received:?}, calculated {calculated:?}")]
    ChecksumMismatch {
        /// Checksum carried by the frame, if any.
        received: Option<u16>,
        /// Checksum calculated over the frame, if the frame could be checked.
        calculated: Option<u16>,
    },
    /// The keyword of the command is not known to the family.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    /// A parameter failed its range check. The field is left unchanged.
    #[error("Parameter {field} with value {value} is out of range. Allowed range is [{min}, {max}]")]
    OutOfRange {
        /// Name of the parameter.
        field: &'static str,
        /// The value that is out of range.
        value: f64,
        /// The minimum value that is allowed.
        min: f64,
        /// The maximum value that is allowed.
        max: f64,
    },
    /// A parameter could not be interpreted at all, e.g., an unknown unit name.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// The target address is out of range for the family or not present on the bus.
    #[error("Address {0} is out of range or not present on the bus")]
    AddressOutOfRange(u32),
    /// An address change would move a device onto an address that is already taken.
    #[error("Address {0} is already in use")]
    AddressInUse(u8),
    /// A bitmask command carries bits that are reserved. Nothing of the mask is applied.
    #[error("Bitmask {mask:#x} sets reserved bits. Allowed bits are {allowed:#x}")]
    InvalidBitmask {
        /// The mask that was sent.
        mask: u32,
        /// All bits that may be set.
        allowed: u32,
    },
    /// A protected command was sent with the wrong PIN.
    #[error("Access denied, wrong PIN")]
    AccessDenied,
}

impl ProtocolError {
    /// Shortcut to build an [`ProtocolError::OutOfRange`] error from any numeric type.
    pub fn out_of_range(field: &'static str, value: impl Into<f64>, min: impl Into<f64>, max: impl Into<f64>) -> Self {
        ProtocolError::OutOfRange {
            field,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        }
    }
}

/// The error enum for everything that can stop an emulator.
///
/// Only problems at the transport or feed boundary end up in here, e.g., the serial device was
/// closed or the measurement feed could not be opened. They are surfaced to the operator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmulatorError {
    /// Error when reading from/writing to a transport. See [`std::io::Error`] for more details.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    /// Serial port errors can occur when opening a serial interface. See the [`serialport::Error`]
    /// documentation for more information.
    #[error(transparent)]
    Serialport(#[from] serialport::Error),
    /// The measurement feed could not be opened.
    #[error("Measurement feed {path:?} is not available: {source}")]
    FeedUnavailable {
        /// Path of the feed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A configuration value was rejected before the emulator started.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A protocol error that was escalated by the caller.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The transport was closed by the other side.
    #[error("Transport was closed")]
    TransportClosed,
    /// One of the emulator threads panicked. Contains the name of the thread.
    #[error("Emulator thread '{0}' panicked")]
    ThreadPanicked(&'static str),
}
