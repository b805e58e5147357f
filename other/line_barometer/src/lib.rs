//! An emulator for a simple line-oriented digital barometer.
//!
//! The barometer talks ASCII lines terminated by CR and/or LF. Every command is a single letter
//! with comma separated parameters, see [`command`] for the grammar. Up to 99 barometers can
//! share an RS-485 bus: address 0 is a stand-alone instrument, addresses 1 to 98 are bus
//! participants that are addressed as `NN:`. A line without address prefix goes to all of them
//! and they answer in address order.
//!
//! | Command                     | Reply                 | Description                            |
//! |-----------------------------|-----------------------|----------------------------------------|
//! | `A,?`                       | `<fmt>,<interval>`    | Query auto-send settings               |
//! | `A,<fmt>,<interval>`        | `<fmt>,<interval>`    | Format 0-12, interval 0-9999 s         |
//! | `N,<addr>`                  | `<addr>`              | Change the address (0-98)              |
//! | `U,<code>`                  | `<code>`              | Unit: hPa, mbar, inHg, mmHg, kPa, psi  |
//! | `F,<n>`                     | `<n>`                 | Average over the last n samples (0-99) |
//! | `C,<0\|1>`                  | `<0\|1>`              | Disable or enable checksums            |
//! | `K,<pin>,<point>,<value>`   | `K,<point>,<value>`   | Offset (point 1) or gain (point 2)     |
//! | `P`                         | measurement           | Poll                                   |
//! | `R` / `S`                   | none                  | Resume or stop auto-send               |
//! | `I`                         | `<model>,<serial>`    | Identify                               |
//!
//! Every reply and measurement is prefixed with `NN:` if the barometer has a non-zero address,
//! carries `*HH` if checksums are enabled, and ends in CR LF. Errors are answered with `ERR`
//! (unknown command or address in use), `CSERR` (checksum) and `PINERR` (wrong PIN). A parameter
//! out of range is not applied and the current setting is sent back instead.
//!
//! # Example
//!
//! ```
//! use line_barometer::LineBarometerProtocol;
//!
//! let mut dispatcher = LineBarometerProtocol::dispatcher(1).unwrap();
//! let dispatched = dispatcher.dispatch(b"A,1,2.00");
//! assert_eq!(dispatched.reply, b"1,2\r\n");
//! ```

#![warn(missing_docs)]

pub mod command;
mod device;
pub mod formats;

use chrono::NaiveDateTime;
use tracing::warn;
use wxemu::{
    AddressTable, Device, Dispatcher, Outcome, Protocol, ProtocolError, Request,
    checksum::xor_checksum, framing::Framing,
};

use command::{Command, MAX_ADDRESS, parse_line};
pub use device::{
    DEFAULT_PIN, GAIN_RANGE, LineBarometer, MAX_FILTER, MAX_INTERVAL, MAX_OFFSET, MODEL,
    UNIT_CODES,
};
use formats::{MAX_FORMAT, preset};

/// The protocol of the line barometer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineBarometerProtocol;

impl LineBarometerProtocol {
    /// A dispatcher with `devices` barometers.
    ///
    /// A single barometer sits at address 0, several barometers at addresses 1 to `devices`.
    pub fn dispatcher(devices: u8) -> Result<Dispatcher<Self>, ProtocolError> {
        if devices == 0 || devices > MAX_ADDRESS {
            return Err(ProtocolError::out_of_range("devices", devices, 1, MAX_ADDRESS));
        }
        let mut table = AddressTable::new(MAX_ADDRESS);
        if devices == 1 {
            table.insert(LineBarometer::new(0, serial_number(0)))?;
        } else {
            for address in 1..=devices {
                table.insert(LineBarometer::new(address, serial_number(address)))?;
            }
        }
        Ok(Dispatcher::new(LineBarometerProtocol, table))
    }
}

fn serial_number(address: u8) -> String {
    format!("B{:07}", 4210 + u32::from(address))
}

/// `NN:` prefix, body, optional checksum, CR LF.
fn frame_line(device: &LineBarometer, body: &str) -> Vec<u8> {
    let mut line = if device.address() == 0 {
        body.to_string()
    } else {
        format!("{:02}:{body}", device.address())
    };
    if device.checksum_enabled() {
        let checksum = xor_checksum(line.as_bytes());
        line.push_str(&format!("*{checksum:02X}"));
    }
    line.push_str("\r\n");
    line.into_bytes()
}

/// The current value of the setting a command tried to change.
fn current_setting(device: &LineBarometer, command: &Command) -> Option<String> {
    let setting = match command {
        Command::AutoSend { .. } => device.auto_send(),
        Command::SetAddress(_) => device.address().to_string(),
        Command::SetUnit(_) => device.unit_code.to_string(),
        Command::SetFilter(_) => device.filter().to_string(),
        Command::SetChecksum(_) => u8::from(device.checksum_enabled()).to_string(),
        Command::Calibrate { point: 1, .. } => format!("K,1,{}", device.offset()),
        Command::Calibrate { point: 2, .. } => format!("K,2,{}", device.gain()),
        _ => return None,
    };
    Some(setting)
}

fn in_range(field: &'static str, value: i64, max: u8) -> Result<u8, ProtocolError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= max)
        .ok_or_else(|| ProtocolError::out_of_range(field, value as f64, 0, max))
}

impl Protocol for LineBarometerProtocol {
    type Command = Command;
    type Device = LineBarometer;

    fn name(&self) -> &'static str {
        "line-barometer"
    }

    fn framing(&self) -> Framing {
        Framing::Line
    }

    fn parse(&self, frame: &[u8]) -> Result<Request<Command>, ProtocolError> {
        parse_line(frame)
    }

    fn checksum_required(&self, device: &LineBarometer) -> bool {
        device.checksum_enabled()
    }

    fn apply(
        &self,
        device: &mut LineBarometer,
        request: &Request<Command>,
    ) -> Result<Outcome, ProtocolError> {
        match &request.command {
            Command::QueryAutoSend => Ok(Outcome::text(device.auto_send())),
            Command::AutoSend { format, interval } => {
                let mut failed = None;
                if let Some(format) = *format {
                    match in_range("format", format, MAX_FORMAT) {
                        Ok(format) => device.format = format,
                        Err(e) => failed = Some(e),
                    }
                }
                if let Some(interval) = *interval {
                    if (0.0..=MAX_INTERVAL).contains(&interval) {
                        device.set_interval(interval);
                    } else {
                        failed.get_or_insert(ProtocolError::out_of_range(
                            "interval",
                            interval,
                            0,
                            MAX_INTERVAL,
                        ));
                    }
                }
                match failed {
                    Some(e) => Err(e),
                    None => Ok(Outcome::text(device.auto_send()).with_wake()),
                }
            }
            Command::QueryAddress => Ok(Outcome::text(device.address().to_string())),
            Command::SetAddress(address) => {
                let address = in_range("address", *address, MAX_ADDRESS)?;
                Ok(Outcome::text(address.to_string()).with_readdress(address))
            }
            Command::QueryUnit => Ok(Outcome::text(device.unit_code.to_string())),
            Command::SetUnit(code) => {
                device.unit_code = in_range("unit", *code, (UNIT_CODES.len() - 1) as u8)?;
                Ok(Outcome::text(device.unit_code.to_string()))
            }
            Command::QueryFilter => Ok(Outcome::text(device.filter().to_string())),
            Command::SetFilter(filter) => {
                device.filter = in_range("filter", *filter, MAX_FILTER)?;
                Ok(Outcome::text(device.filter().to_string()))
            }
            Command::QueryChecksum => Ok(Outcome::text(
                u8::from(device.checksum_enabled()).to_string(),
            )),
            Command::SetChecksum(enabled) => {
                device.checksum = in_range("checksum", *enabled, 1)? == 1;
                Ok(Outcome::text(u8::from(device.checksum).to_string()))
            }
            Command::Calibrate { pin, point, value } => {
                if *pin != device.pin {
                    return Err(ProtocolError::AccessDenied);
                }
                match point {
                    1 if value.abs() <= MAX_OFFSET => device.offset = *value,
                    1 => {
                        return Err(ProtocolError::out_of_range(
                            "offset",
                            *value,
                            -MAX_OFFSET,
                            MAX_OFFSET,
                        ));
                    }
                    2 if (GAIN_RANGE.0..=GAIN_RANGE.1).contains(value) => device.gain = *value,
                    2 => {
                        return Err(ProtocolError::out_of_range(
                            "gain",
                            *value,
                            GAIN_RANGE.0,
                            GAIN_RANGE.1,
                        ));
                    }
                    _ => return Err(ProtocolError::out_of_range("point", *point as f64, 1, 2)),
                }
                Ok(Outcome::text(format!("K,{point},{value}")))
            }
            Command::Poll => Ok(Outcome::measurement()),
            Command::Resume => {
                device.schedule_mut().start();
                Ok(Outcome::silent().with_wake())
            }
            Command::Stop => {
                device.schedule_mut().stop();
                Ok(Outcome::silent().with_wake())
            }
            Command::Identify => Ok(Outcome::text(format!("{MODEL},{}", device.serial()))),
            Command::Unknown(text) => Err(ProtocolError::UnknownCommand(text.clone())),
        }
    }

    fn encode_reply(&self, device: &LineBarometer, _request: &Request<Command>, body: &str) -> Vec<u8> {
        frame_line(device, body)
    }

    fn encode_error(
        &self,
        device: Option<&LineBarometer>,
        request: Option<&Request<Command>>,
        error: &ProtocolError,
    ) -> Option<Vec<u8>> {
        // Frames that cannot be attributed to a barometer are dropped.
        let device = device?;
        let body = match error {
            ProtocolError::ChecksumMismatch { .. } => "CSERR".to_string(),
            ProtocolError::AccessDenied => "PINERR".to_string(),
            ProtocolError::OutOfRange { .. } | ProtocolError::InvalidParameter(_) => request
                .and_then(|request| current_setting(device, &request.command))
                .unwrap_or_else(|| "ERR".to_string()),
            _ => "ERR".to_string(),
        };
        Some(frame_line(device, &body))
    }

    fn render_measurement(&self, device: &LineBarometer, timestamp: NaiveDateTime) -> Vec<u8> {
        match preset(device.format()) {
            Ok(format) => frame_line(device, &format.evaluate(&device.reading(timestamp))),
            Err(error) => {
                warn!(format = device.format(), %error, "output format unavailable");
                Vec::new()
            }
        }
    }
}
