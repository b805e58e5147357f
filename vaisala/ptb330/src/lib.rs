//! An emulator for the Vaisala PTB330 digital barometer.
//!
//! The PTB330 talks plain text lines terminated by CR. Commands are keywords with space separated
//! parameters, a keyword without parameters reports the current setting. The output message is
//! freely configurable with `FORM`, see [`variables`] for what it can show and
//! [`wxemu::format`] for the format language.
//!
//! | Command                    | Description                                               |
//! |----------------------------|-----------------------------------------------------------|
//! | `R` / `S`                  | Start or stop continuous output                           |
//! | `SEND [addr]`              | Send one message                                          |
//! | `SMODE [STOP\|RUN\|POLL\|SEND]` | Serial mode                                          |
//! | `INTV [n s\|min\|h]`       | Output interval, 1 to 255 units                           |
//! | `FORM [format\|/]`         | Output format, `/` restores the factory format            |
//! | `UNIT [P\|T] [unit]`       | Pressure or temperature unit                              |
//! | `ADDR [0-255]`             | Bus address                                               |
//! | `OPEN addr` / `CLOSE`      | Open a barometer in POLL mode for commands, close again   |
//! | `SERI [baud p d s]`        | Serial line settings                                      |
//! | `ECHO [ON\|OFF]`           | Echo commands                                             |
//! | `HHCP`, `HQFE`, `HQNH [m]` | Heights for the HCP, QFE, and QNH pressures               |
//! | `AVRG [s]`                 | Averaging time, 0 to 600 s                                |
//! | `PSTAB [hPa]`              | Limit of the pressure stability indicator                 |
//! | `SNUM`, `VERS`, `?`        | Serial number, firmware version, all settings             |
//! | `ERRS`                     | Active errors                                             |
//! | `RESET`                    | Restart                                                   |
//!
//! In POLL mode, a barometer only listens to `SEND <addr>` and `OPEN <addr>` with its own
//! address. After `OPEN` it takes every command until `CLOSE`. Several barometers on one bus
//! therefore start in POLL mode, a single barometer starts in STOP mode.
//!
//! # Example
//!
//! ```
//! use vaisala_ptb330::Ptb330Protocol;
//!
//! let mut dispatcher = Ptb330Protocol::dispatcher(1).unwrap();
//! let dispatched = dispatcher.dispatch(b"SMODE");
//! assert_eq!(dispatched.reply, b"Serial mode    : STOP\r\n");
//! ```

#![warn(missing_docs)]

pub mod command;
mod device;
pub mod variables;

use std::fmt::Display;

use chrono::NaiveDateTime;
use tracing::{info, warn};
use wxemu::{
    AddressTable, Device, Dispatcher, OutputMode, Outcome, Protocol, ProtocolError, Request,
    format::compile, framing::Framing, tokenizer::Setting,
};

use command::{Command, Height, IntervalUpdate, LineUpdate, UnitUpdate, parse_line};
pub use device::{
    BAUD_RATES, DEFAULT_FORMAT, HEIGHT_RANGE, INTERVAL_RANGE, IntervalUnit, LineSettings,
    MAX_ADDRESS, MAX_AVERAGING, MAX_STABILITY_LIMIT, MODEL, MODULES, Parity, Ptb330,
    QNH_HEIGHT_RANGE, SerialMode, VERSION,
};
use variables::PtbVariable;

/// The protocol of the PTB330.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ptb330Protocol;

impl Ptb330Protocol {
    /// A dispatcher with `devices` barometers at addresses 0 to `devices - 1`.
    ///
    /// A single barometer starts in STOP mode, several barometers start in POLL mode.
    pub fn dispatcher(devices: u8) -> Result<Dispatcher<Self>, ProtocolError> {
        if devices == 0 {
            return Err(ProtocolError::out_of_range("devices", devices, 1, MAX_ADDRESS));
        }
        let smode = if devices == 1 {
            SerialMode::Stop
        } else {
            SerialMode::Poll
        };
        let mut table = AddressTable::new(MAX_ADDRESS);
        for address in 0..devices {
            table.insert(Ptb330::new(address, serial_number(address), smode))?;
        }
        Ok(Dispatcher::new(Ptb330Protocol, table))
    }
}

fn serial_number(address: u8) -> String {
    format!("P{}", 4_250_000 + u32::from(address))
}

/// One line of a settings report, `<label padded>: <value>`.
fn field(label: &str, value: impl Display) -> String {
    format!("{label:<15}: {value}")
}

fn version() -> String {
    format!("{MODEL} / {VERSION}")
}

/// The reply body, preceded by the echoed command if echo is on.
fn frame(device: &Ptb330, request: Option<&Request<Command>>, body: &str) -> Vec<u8> {
    let mut out = String::new();
    if let Some(request) = request.filter(|_| device.echo()) {
        out.push_str(&request.text);
        out.push_str("\r\n");
    }
    out.push_str(body);
    out.push_str("\r\n");
    out.into_bytes()
}

fn is_own(device: &Ptb330, address: i64) -> bool {
    address == i64::from(device.address())
}

fn invalid(what: &str, text: &str) -> ProtocolError {
    ProtocolError::InvalidParameter(format!("{what}: {text}"))
}

fn checked(field: &'static str, value: f64, range: (f64, f64)) -> Result<f64, ProtocolError> {
    if (range.0..=range.1).contains(&value) {
        Ok(value)
    } else {
        Err(ProtocolError::out_of_range(field, value, range.0, range.1))
    }
}

fn interval_report(device: &Ptb330) -> String {
    let (value, unit) = device.interval();
    field("Output intrv.", format!("{value} {}", unit.label()))
}

fn height_report(device: &Ptb330, height: Height) -> String {
    let (label, value) = match height {
        Height::Hcp => ("HCP height", device.hcp_height),
        Height::Qfe => ("QFE height", device.qfe_height),
        Height::Qnh => ("QNH height", device.qnh_height),
    };
    field(label, format!("{value:.2} m"))
}

fn unit_report(device: &Ptb330) -> String {
    [
        field("P unit", device.pressure_unit()),
        field("T unit", device.temperature_unit()),
    ]
    .join("\r\n")
}

/// All settings, as reported by `?`.
fn info(device: &Ptb330) -> String {
    [
        version(),
        field("Serial number", device.serial()),
        field("Output format", device.format_source()),
        field("Address", device.address()),
        field("Serial mode", device.smode().label()),
        interval_report(device),
        unit_report(device),
        field("Baud P D S", device.line()),
        field("Echo", if device.echo() { "ON" } else { "OFF" }),
        height_report(device, Height::Hcp),
        height_report(device, Height::Qfe),
        height_report(device, Height::Qnh),
        field("Averaging time", format!("{:.1} s", device.averaging())),
        field(
            "Stability limit",
            format!("{:.2} hPa", device.stability_limit),
        ),
    ]
    .join("\r\n")
}

/// Apply every field of a `SERI` command on its own. Returns the first failure.
fn update_line(line: &mut LineSettings, update: &LineUpdate) -> Option<ProtocolError> {
    let mut failed = None;
    if let Some(baud) = update.baud {
        match u32::try_from(baud).ok().filter(|baud| BAUD_RATES.contains(baud)) {
            Some(baud) => line.baud = baud,
            None => {
                failed.get_or_insert(ProtocolError::InvalidParameter(format!("baud rate {baud}")));
            }
        }
    }
    if let Some(parity) = update.parity {
        match parity {
            Some(parity) => line.parity = parity,
            None => {
                failed.get_or_insert(ProtocolError::InvalidParameter("parity".into()));
            }
        }
    }
    if let Some(bits) = update.data_bits {
        match bits {
            7 | 8 => line.data_bits = bits as u8,
            _ => {
                failed.get_or_insert(ProtocolError::out_of_range("data bits", bits as f64, 7, 8));
            }
        }
    }
    if let Some(bits) = update.stop_bits {
        match bits {
            1 | 2 => line.stop_bits = bits as u8,
            _ => {
                failed.get_or_insert(ProtocolError::out_of_range("stop bits", bits as f64, 1, 2));
            }
        }
    }
    failed
}

impl Protocol for Ptb330Protocol {
    type Command = Command;
    type Device = Ptb330;

    fn name(&self) -> &'static str {
        "ptb330"
    }

    fn framing(&self) -> Framing {
        Framing::Line
    }

    fn parse(&self, frame: &[u8]) -> Result<Request<Command>, ProtocolError> {
        parse_line(frame)
    }

    fn apply(
        &self,
        device: &mut Ptb330,
        request: &Request<Command>,
    ) -> Result<Outcome, ProtocolError> {
        match &request.command {
            Command::Send(Some(address)) if is_own(device, *address) => Ok(Outcome::measurement()),
            Command::Send(Some(_)) => Ok(Outcome::silent()),
            Command::Open(address) if is_own(device, *address) => {
                device.open = true;
                Ok(Outcome::text(format!(
                    "{MODEL}: {address} line opened for operator commands"
                )))
            }
            Command::Open(_) => {
                device.open = false;
                Ok(Outcome::silent())
            }
            _ if !device.is_listening() => Ok(Outcome::silent()),

            Command::Run => {
                device.schedule_mut().set_mode(OutputMode::Continuous);
                Ok(Outcome::silent().with_wake())
            }
            Command::Stop => {
                let mode = match device.smode() {
                    SerialMode::Poll => OutputMode::Polled,
                    _ => OutputMode::Stopped,
                };
                device.schedule_mut().set_mode(mode);
                Ok(Outcome::silent().with_wake())
            }
            Command::Send(None) => Ok(Outcome::measurement()),

            Command::Smode(Setting::Query) => Ok(Outcome::text(field(
                "Serial mode",
                device.smode().label(),
            ))),
            Command::Smode(Setting::Set(smode)) => {
                device.set_smode(*smode);
                Ok(Outcome::text(field("Serial mode", smode.label())).with_wake())
            }
            Command::Smode(Setting::Invalid(text)) => Err(invalid("serial mode", text)),

            Command::Intv(Setting::Query) => Ok(Outcome::text(interval_report(device))),
            Command::Intv(Setting::Set(IntervalUpdate { value, unit })) => {
                let (min, max) = INTERVAL_RANGE;
                if !(min..=max).contains(value) {
                    return Err(ProtocolError::out_of_range(
                        "interval",
                        *value as f64,
                        min as f64,
                        max as f64,
                    ));
                }
                device.set_interval(*value as u8, *unit);
                Ok(Outcome::text(interval_report(device)).with_wake())
            }
            Command::Intv(Setting::Invalid(text)) => Err(invalid("interval", text)),

            Command::Form(Setting::Query) => Ok(Outcome::text(field(
                "Output format",
                device.format_source(),
            ))),
            Command::Form(Setting::Set(source)) => {
                device.format = Some(compile::<PtbVariable>(source)?);
                Ok(Outcome::text(field("Output format", source)))
            }
            Command::Form(Setting::Invalid(text)) => Err(invalid("format", text)),
            Command::FormReset => {
                device.format = None;
                Ok(Outcome::text(field("Output format", DEFAULT_FORMAT)))
            }

            Command::Unit(Setting::Query) => Ok(Outcome::text(unit_report(device))),
            Command::Unit(Setting::Set(UnitUpdate::Pressure(unit))) => {
                device.pressure_unit = *unit;
                Ok(Outcome::text(field("P unit", unit)))
            }
            Command::Unit(Setting::Set(UnitUpdate::Temperature(unit))) => {
                device.temperature_unit = *unit;
                Ok(Outcome::text(field("T unit", unit)))
            }
            Command::Unit(Setting::Invalid(text)) => Err(invalid("unit", text)),

            Command::Addr(Setting::Query) => Ok(Outcome::text(field("Address", device.address()))),
            Command::Addr(Setting::Set(address)) => {
                let address = u8::try_from(*address).map_err(|_| {
                    ProtocolError::out_of_range("address", *address as f64, 0, MAX_ADDRESS)
                })?;
                Ok(Outcome::text(field("Address", address)).with_readdress(address))
            }
            Command::Addr(Setting::Invalid(text)) => Err(invalid("address", text)),

            Command::Close => {
                device.open = false;
                Ok(Outcome::text("line closed"))
            }

            Command::Seri(Setting::Query) => Ok(Outcome::text(field("Baud P D S", device.line()))),
            Command::Seri(Setting::Set(update)) => {
                let failed = update_line(&mut device.line, update);
                info!(settings = %device.line, "serial line settings stored");
                match failed {
                    Some(error) => Err(error),
                    None => Ok(Outcome::text(field("Baud P D S", device.line()))),
                }
            }
            Command::Seri(Setting::Invalid(text)) => Err(invalid("serial settings", text)),

            Command::Echo(Setting::Query) => Ok(Outcome::text(field(
                "Echo",
                if device.echo() { "ON" } else { "OFF" },
            ))),
            Command::Echo(Setting::Set(echo)) => {
                device.echo = *echo;
                Ok(Outcome::text(field("Echo", if *echo { "ON" } else { "OFF" })))
            }
            Command::Echo(Setting::Invalid(text)) => Err(invalid("echo", text)),

            Command::Height(height, Setting::Query) => Ok(Outcome::text(height_report(device, *height))),
            Command::Height(height, Setting::Set(value)) => {
                match height {
                    Height::Hcp => device.hcp_height = checked("HCP height", *value, HEIGHT_RANGE)?,
                    Height::Qfe => device.qfe_height = checked("QFE height", *value, HEIGHT_RANGE)?,
                    Height::Qnh => {
                        device.qnh_height = checked("QNH height", *value, QNH_HEIGHT_RANGE)?
                    }
                }
                Ok(Outcome::text(height_report(device, *height)))
            }
            Command::Height(_, Setting::Invalid(text)) => Err(invalid("height", text)),

            Command::Avrg(Setting::Query) => Ok(Outcome::text(field(
                "Averaging time",
                format!("{:.1} s", device.averaging()),
            ))),
            Command::Avrg(Setting::Set(seconds)) => {
                device.averaging = checked("averaging", *seconds, (0.0, MAX_AVERAGING))?;
                Ok(Outcome::text(field(
                    "Averaging time",
                    format!("{:.1} s", device.averaging()),
                )))
            }
            Command::Avrg(Setting::Invalid(text)) => Err(invalid("averaging", text)),

            Command::Pstab(Setting::Query) => Ok(Outcome::text(field(
                "Stability limit",
                format!("{:.2} hPa", device.stability_limit),
            ))),
            Command::Pstab(Setting::Set(limit)) => {
                device.stability_limit =
                    checked("stability limit", *limit, (0.0, MAX_STABILITY_LIMIT))?;
                Ok(Outcome::text(field(
                    "Stability limit",
                    format!("{:.2} hPa", device.stability_limit),
                )))
            }
            Command::Pstab(Setting::Invalid(text)) => Err(invalid("stability limit", text)),

            Command::Snum => Ok(Outcome::text(field("Serial number", device.serial()))),
            Command::Vers => Ok(Outcome::text(version())),
            Command::Info => Ok(Outcome::text(info(device))),
            Command::Errs => {
                if device.module_pressures().iter().any(Option::is_some) {
                    Ok(Outcome::text("No errors"))
                } else {
                    Ok(Outcome::text("Error: no pressure measurement"))
                }
            }
            Command::Reset => {
                info!(address = device.address(), "barometer restarted");
                device.restart();
                Ok(Outcome::text(version()).with_wake())
            }
            Command::Unknown(keyword) => Err(ProtocolError::UnknownCommand(keyword.clone())),
        }
    }

    fn encode_reply(&self, device: &Ptb330, request: &Request<Command>, body: &str) -> Vec<u8> {
        frame(device, Some(request), body)
    }

    fn encode_error(
        &self,
        device: Option<&Ptb330>,
        request: Option<&Request<Command>>,
        error: &ProtocolError,
    ) -> Option<Vec<u8>> {
        let device = device.filter(|device| device.is_listening())?;
        let body = match error {
            ProtocolError::UnknownCommand(_) => "Unknown command",
            ProtocolError::OutOfRange { .. } => "Value out of range",
            ProtocolError::InvalidParameter(_) => "Invalid parameter",
            ProtocolError::AddressInUse(_) => "Address in use",
            _ => return None,
        };
        Some(frame(device, request, body))
    }

    fn render_measurement(&self, device: &Ptb330, timestamp: NaiveDateTime) -> Vec<u8> {
        let reading = device.reading(timestamp);
        match &device.format {
            Some(format) => format.evaluate(&reading).into_bytes(),
            None => match compile::<PtbVariable>(DEFAULT_FORMAT) {
                Ok(format) => format.evaluate(&reading).into_bytes(),
                Err(error) => {
                    warn!(%error, "factory format unavailable");
                    Vec::new()
                }
            },
        }
    }
}
