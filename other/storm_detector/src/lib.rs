//! An emulator for a thunderstorm detector with a space separated, CRC-framed protocol.
//!
//! The detector counts cloud-to-ground and cloud-to-cloud strikes from the measurement feed and
//! reports them either on request (`POLL`) or every interval (`MODE CONT`). Commands and replies
//! are STX/ETX blocks with a trailing CRC token, see [`command`]. Frames with a wrong CRC are
//! answered with `NAK CRC`.
//!
//! | Command                | Reply                                               |
//! |------------------------|-----------------------------------------------------|
//! | `STATUS`               | `STATUS <mode> <interval> <unit> <squelch> [msg]`   |
//! | `MODE CONT\|POLL\|STOP`| `ACK MODE`                                          |
//! | `INTERVAL <1-3600>`    | `ACK INTERVAL`                                      |
//! | `POLL`                 | `DATA <total> <cg> <cc> <distance> <bearing> [msg]` |
//! | `MSG <text>`           | `ACK MSG`, text of up to 32 characters              |
//! | `RANGE KM\|MI\|NM`     | `ACK RANGE`                                         |
//! | `SQUELCH <0-15>`       | `ACK SQUELCH`                                       |
//! | `RESET`                | `ACK RESET`, clears the strike counters             |
//! | `ID`                   | `ID <model> <serial> <firmware>`                    |
//!
//! Errors are answered with `NAK <reason>`: `CRC`, `UNKNOWN`, `RANGE`, or `PARAM`.
//!
//! # Example
//!
//! ```
//! use storm_detector::{StormDetectorProtocol, command::frame};
//!
//! let mut dispatcher = StormDetectorProtocol::dispatcher("T0001234").unwrap();
//! assert_eq!(dispatcher.dispatch(&frame("RANGE NM")).reply, frame("ACK RANGE"));
//! ```

#![warn(missing_docs)]

pub mod command;
mod device;

use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::info;
use wxemu::{
    AddressTable, Device, Dispatcher, Outcome, Protocol, ProtocolError, Request, framing::Framing,
};

use command::{Command, frame, parse_block};
pub use device::{
    FIRMWARE, INTERVAL_RANGE, MAX_MSG_LEN, MAX_SQUELCH, MODEL, RangeUnit, StormDetector,
    StrikeCount,
};

/// The protocol of the thunderstorm detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct StormDetectorProtocol;

impl StormDetectorProtocol {
    /// A dispatcher with one detector.
    pub fn dispatcher(serial: &str) -> Result<Dispatcher<Self>, ProtocolError> {
        let table = AddressTable::with_device(0, StormDetector::new(serial))?;
        Ok(Dispatcher::new(StormDetectorProtocol, table))
    }
}

fn ack(command: &Command) -> Outcome {
    Outcome::text(format!("ACK {}", command.keyword()))
}

impl Protocol for StormDetectorProtocol {
    type Command = Command;
    type Device = StormDetector;

    fn name(&self) -> &'static str {
        "storm-detector"
    }

    fn framing(&self) -> Framing {
        Framing::Block
    }

    fn parse(&self, frame: &[u8]) -> Result<Request<Command>, ProtocolError> {
        parse_block(frame)
    }

    fn checksum_required(&self, _device: &StormDetector) -> bool {
        true
    }

    fn apply(
        &self,
        device: &mut StormDetector,
        request: &Request<Command>,
    ) -> Result<Outcome, ProtocolError> {
        let command = &request.command;
        match command {
            Command::Status => Ok(Outcome::text(format!("STATUS {}", device.status()))),
            Command::Mode(mode) => {
                let mode = mode.ok_or_else(|| {
                    ProtocolError::InvalidParameter("mode must be CONT, POLL, or STOP".into())
                })?;
                device.schedule_mut().set_mode(mode);
                Ok(ack(command).with_wake())
            }
            Command::Interval(seconds) => {
                let (min, max) = INTERVAL_RANGE;
                if !(min..=max).contains(seconds) {
                    return Err(ProtocolError::out_of_range(
                        "interval",
                        *seconds as f64,
                        min as f64,
                        max as f64,
                    ));
                }
                device
                    .schedule_mut()
                    .set_interval(Duration::from_secs(*seconds as u64));
                Ok(ack(command).with_wake())
            }
            Command::Poll => Ok(Outcome::measurement()),
            Command::Msg(text) => {
                let len = text.chars().count();
                if len > MAX_MSG_LEN {
                    return Err(ProtocolError::out_of_range(
                        "msg",
                        len as f64,
                        0,
                        MAX_MSG_LEN as f64,
                    ));
                }
                device.message = text.clone();
                Ok(ack(command))
            }
            Command::Range(unit) => {
                device.range = unit.ok_or_else(|| {
                    ProtocolError::InvalidParameter("range must be KM, MI, or NM".into())
                })?;
                Ok(ack(command))
            }
            Command::Squelch(level) => {
                device.squelch = u8::try_from(*level)
                    .ok()
                    .filter(|level| *level <= MAX_SQUELCH)
                    .ok_or_else(|| {
                        ProtocolError::out_of_range("squelch", *level as f64, 0, MAX_SQUELCH)
                    })?;
                Ok(ack(command))
            }
            Command::Reset => {
                info!(total = device.strikes.total(), "strike counters cleared");
                device.strikes = StrikeCount::default();
                Ok(ack(command))
            }
            Command::Id => Ok(Outcome::text(format!(
                "ID {MODEL} {} {FIRMWARE}",
                device.serial()
            ))),
            Command::Unknown(keyword) => Err(ProtocolError::UnknownCommand(keyword.clone())),
        }
    }

    fn encode_reply(&self, _device: &StormDetector, _request: &Request<Command>, body: &str) -> Vec<u8> {
        frame(body)
    }

    fn encode_error(
        &self,
        device: Option<&StormDetector>,
        _request: Option<&Request<Command>>,
        error: &ProtocolError,
    ) -> Option<Vec<u8>> {
        device?;
        let reason = match error {
            ProtocolError::ChecksumMismatch { .. } => "CRC",
            ProtocolError::UnknownCommand(_) => "UNKNOWN",
            ProtocolError::OutOfRange { .. } => "RANGE",
            ProtocolError::InvalidParameter(_) => "PARAM",
            _ => return None,
        };
        Some(frame(&format!("NAK {reason}")))
    }

    fn render_measurement(&self, device: &StormDetector, _timestamp: NaiveDateTime) -> Vec<u8> {
        frame(&device.data())
    }
}
