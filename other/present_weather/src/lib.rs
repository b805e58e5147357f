//! An emulator for a visibility and present-weather sensor with a CRC-framed block protocol.
//!
//! Up to 10 sensors (ids 0 to 9) can share one line. Every command and every reply is one
//! STX/ETX block of colon separated fields, protected by a CRC-16/CCITT, see [`command`] for the
//! framing. The sensor keeps two sets of settings: the active ones and the committed ones. `SET`
//! changes both, `SETNC` only the active settings, and `RESET` reverts the active settings to the
//! committed ones.
//!
//! | Command                    | Reply                     | Description                       |
//! |----------------------------|---------------------------|-----------------------------------|
//! | `GET:id:0`                 | `SET:id:<f1>:...:<f8>`    | Read the active settings          |
//! | `SET:id:<f1>:...:<f8>`     | `SET:id:<f1>:...:<f8>`    | Change and commit the settings    |
//! | `SETNC:id:<f1>:...:<f8>`   | `SET:id:<f1>:...:<f8>`    | Change without commit             |
//! | `MSGSET:id:<mask>`         | `MSGSET:id:<mask>`        | Fields of the custom message      |
//! | `POLL:id:0`                | `DATA:id:...`             | Request a data message            |
//! | `CAL:id:<pin>:<pt>:<val>`  | `CAL:id:<pt>:<val>`       | Zero (point 1) or span (point 2)  |
//! | `RESET:id:0`               | `SET:id:<f1>:...:<f8>`    | Revert to the committed settings  |
//!
//! The settings fields are, in this order: id (0-9), message interval (0-3600 s), message format
//! (0 standard, 1 custom), mode (0 polled, 1 continuous), baud rate code (0-7), visibility units
//! (0 m, 1 ft), averaging time (1 or 10 min), and CRC checking (0 off, 1 on). Fields that do not
//! parse keep their value, and so do fields that are out of range while the others are applied.
//! A new id that another sensor holds rejects the whole command, nothing of it is applied.
//!
//! Errors are answered with `ERR:id:<code>`: 1 checksum, 2 unknown command, 3 out of range,
//! 4 wrong PIN, 5 reserved bits in the message mask. Malformed blocks are dropped.
//!
//! # Example
//!
//! ```
//! use present_weather::{PresentWeatherProtocol, command::frame};
//!
//! let mut dispatcher = PresentWeatherProtocol::dispatcher(1).unwrap();
//! let dispatched = dispatcher.dispatch(&frame("GET:0:0"));
//! assert_eq!(dispatched.reply, frame("SET:0:60:0:0:4:0:1:1"));
//! ```

#![warn(missing_docs)]

pub mod command;
pub mod data;
mod device;

use chrono::NaiveDateTime;
use wxemu::{
    AddressTable, Device, Dispatcher, Outcome, Protocol, ProtocolError, Request, framing::Framing,
};

use command::{Command, MAX_ID, frame, parse_block};
pub use device::{
    DEFAULT_PIN, MAX_BAUD_CODE, MAX_INTERVAL, MESSAGE_FIELDS, MESSAGE_MASK_ALLOWED, MessageFormat,
    Observation, PresentWeather, SPAN_RANGE, Settings, VisibilityUnit, ZERO_RANGE,
};

/// The protocol of the present-weather sensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentWeatherProtocol;

impl PresentWeatherProtocol {
    /// A dispatcher with `devices` sensors at ids 0 to `devices - 1`.
    pub fn dispatcher(devices: u8) -> Result<Dispatcher<Self>, ProtocolError> {
        if devices == 0 || devices > MAX_ID + 1 {
            return Err(ProtocolError::out_of_range("devices", devices, 1, MAX_ID + 1));
        }
        let mut table = AddressTable::new(MAX_ID);
        for id in 0..devices {
            table.insert(PresentWeather::new(id))?;
        }
        Ok(Dispatcher::new(PresentWeatherProtocol, table))
    }
}

fn error_code(error: &ProtocolError) -> Option<u8> {
    match error {
        ProtocolError::ChecksumMismatch { .. } => Some(1),
        ProtocolError::UnknownCommand(_) => Some(2),
        ProtocolError::OutOfRange { .. }
        | ProtocolError::InvalidParameter(_)
        | ProtocolError::AddressInUse(_) => Some(3),
        ProtocolError::AccessDenied => Some(4),
        ProtocolError::InvalidBitmask { .. } => Some(5),
        _ => None,
    }
}

impl Protocol for PresentWeatherProtocol {
    type Command = Command;
    type Device = PresentWeather;

    fn name(&self) -> &'static str {
        "present-weather"
    }

    fn framing(&self) -> Framing {
        Framing::Block
    }

    fn parse(&self, frame: &[u8]) -> Result<Request<Command>, ProtocolError> {
        parse_block(frame)
    }

    fn checksum_required(&self, device: &PresentWeather) -> bool {
        device.active.crc_check
    }

    fn requested_address(
        &self,
        device: &PresentWeather,
        request: &Request<Command>,
    ) -> Option<u8> {
        match &request.command {
            Command::Set(update) | Command::SetNoCommit(update) => update
                .id
                .filter(|id| (0..=i64::from(MAX_ID)).contains(id))
                .map(|id| id as u8),
            Command::Reset => Some(device.committed_id),
            _ => None,
        }
    }

    fn apply(
        &self,
        device: &mut PresentWeather,
        request: &Request<Command>,
    ) -> Result<Outcome, ProtocolError> {
        let id = device.address();
        match &request.command {
            Command::Get => Ok(Outcome::text(format!("SET:{}", device.active.render(id)))),
            Command::Set(update) | Command::SetNoCommit(update) => {
                let (new_id, failed) = device.active.update(update);
                device.sync_schedule();
                // the id only moves if the whole command was accepted
                let new_id = match failed {
                    Some(_) => id,
                    None => new_id.unwrap_or(id),
                };
                if matches!(request.command, Command::Set(_)) {
                    device.committed = device.active;
                    device.committed_id = new_id;
                }
                if let Some(error) = failed {
                    return Err(error);
                }
                let outcome = Outcome::text(format!("SET:{}", device.active.render(new_id)));
                Ok(if new_id == id {
                    outcome.with_wake()
                } else {
                    outcome.with_wake().with_readdress(new_id)
                })
            }
            Command::MsgSet(mask) => {
                let mask = mask.ok_or_else(|| {
                    ProtocolError::InvalidParameter("message mask is not hex".into())
                })?;
                if mask & !MESSAGE_MASK_ALLOWED != 0 {
                    return Err(ProtocolError::InvalidBitmask {
                        mask,
                        allowed: MESSAGE_MASK_ALLOWED,
                    });
                }
                device.message_mask = mask;
                Ok(Outcome::text(format!("MSGSET:{id}:{mask:X}")))
            }
            Command::Poll => Ok(Outcome::measurement()),
            Command::Calibrate { pin, point, value } => {
                if *pin != device.pin {
                    return Err(ProtocolError::AccessDenied);
                }
                let (range, slot) = match point {
                    1 => (ZERO_RANGE, &mut device.zero),
                    2 => (SPAN_RANGE, &mut device.span),
                    _ => return Err(ProtocolError::out_of_range("point", *point as f64, 1, 2)),
                };
                if !(range.0..=range.1).contains(value) {
                    return Err(ProtocolError::out_of_range(
                        "calibration", *value, range.0, range.1,
                    ));
                }
                *slot = *value;
                Ok(Outcome::text(format!("CAL:{id}:{point}:{value}")))
            }
            Command::Reset => {
                device.active = device.committed;
                device.sync_schedule();
                let committed_id = device.committed_id;
                let outcome = Outcome::text(format!("SET:{}", device.active.render(committed_id)))
                    .with_wake();
                Ok(if committed_id == id {
                    outcome
                } else {
                    outcome.with_readdress(committed_id)
                })
            }
            Command::Unknown(keyword) => Err(ProtocolError::UnknownCommand(keyword.clone())),
        }
    }

    fn encode_reply(
        &self,
        _device: &PresentWeather,
        _request: &Request<Command>,
        body: &str,
    ) -> Vec<u8> {
        frame(body)
    }

    fn encode_error(
        &self,
        device: Option<&PresentWeather>,
        _request: Option<&Request<Command>>,
        error: &ProtocolError,
    ) -> Option<Vec<u8>> {
        let id = device?.address();
        let code = error_code(error)?;
        Some(frame(&format!("ERR:{id}:{code}")))
    }

    fn render_measurement(&self, device: &PresentWeather, _timestamp: NaiveDateTime) -> Vec<u8> {
        frame(&data::render(device, device.address()))
    }
}
