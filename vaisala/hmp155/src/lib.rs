//! An emulator for the Vaisala HMP155 humidity and temperature probe.
//!
//! The probe speaks the same line based command language as the Vaisala barometers: a keyword,
//! optional parameters, and CR. Dew point, absolute humidity, and mixing ratio are derived from
//! the fed relative humidity and temperature, see [`variables`].
//!
//! | Command                         | Description                                          |
//! |---------------------------------|------------------------------------------------------|
//! | `R` / `S`                       | Start or stop continuous output                      |
//! | `SEND [addr]`                   | Send one message                                     |
//! | `SMODE [STOP\|RUN\|POLL\|SEND]` | Serial mode                                          |
//! | `INTV [n s\|min\|h]`            | Output interval, 0 to 255 units                      |
//! | `FORM [format\|/]`              | Output format                                        |
//! | `ADDR [0-99]`                   | Bus address                                          |
//! | `OPEN addr` / `CLOSE`           | Open a probe in POLL mode for commands               |
//! | `UNIT [M\|N]`                   | Metric or non-metric output                          |
//! | `XHEAT [ON\|OFF]`               | Enable the extra heating                             |
//! | `XHEAT rh temp time`            | Heating limits: RH 0-100 %, 0-200 °C, 0-255 s        |
//! | `SNUM`, `VERS`, `?`             | Serial number, version, all settings                 |
//! | `RESET`                         | Restart                                              |
//!
//! # Example
//!
//! ```
//! use vaisala_hmp155::Hmp155Protocol;
//! use wxemu::ParsedMessage;
//!
//! let mut dispatcher = Hmp155Protocol::dispatcher(1).unwrap();
//! dispatcher.ingest(&ParsedMessage::parse("RH=45.3 T=21.5").unwrap());
//! let dispatched = dispatcher.dispatch(b"SEND");
//! let message = dispatcher.render_measurements(&dispatched.measurements, Default::default());
//! assert_eq!(message, b"RH= 45.3 %RH T= 21.5 'C\r\n");
//! ```

#![warn(missing_docs)]

pub mod command;
mod device;
pub mod variables;

use std::fmt::Display;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use wxemu::{
    AddressTable, Device, Dispatcher, OutputMode, Outcome, Protocol, ProtocolError, Request,
    format::compile, framing::Framing, tokenizer::Setting,
};

use command::{Command, HeatUpdate, parse_line};
pub use device::{
    DEFAULT_FORMAT, ExtraHeat, HEAT_RH_RANGE, HEAT_TEMPERATURE_RANGE, HEAT_TIME_RANGE, Hmp155,
    IntervalUnit, MAX_ADDRESS, MAX_INTERVAL, MODEL, SerialMode, UnitSystem, VERSION,
};
use variables::HmpVariable;

/// The protocol of the HMP155.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hmp155Protocol;

impl Hmp155Protocol {
    /// A dispatcher with `devices` probes at addresses 0 to `devices - 1`. Several probes share
    /// the line in POLL mode.
    pub fn dispatcher(devices: u8) -> Result<Dispatcher<Self>, ProtocolError> {
        if devices == 0 || devices > MAX_ADDRESS + 1 {
            return Err(ProtocolError::out_of_range(
                "devices",
                devices,
                1,
                MAX_ADDRESS + 1,
            ));
        }
        let smode = match devices {
            1 => SerialMode::Stop,
            _ => SerialMode::Poll,
        };
        let mut table = AddressTable::new(MAX_ADDRESS);
        for address in 0..devices {
            let serial = format!("H{}", 5_150_000 + u32::from(address));
            table.insert(Hmp155::new(address, serial, smode))?;
        }
        Ok(Dispatcher::new(Hmp155Protocol, table))
    }
}

fn field(label: &str, value: impl Display) -> String {
    format!("{label:<15}: {value}")
}

fn version() -> String {
    format!("{MODEL} / {VERSION}")
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

fn invalid(text: &str) -> ProtocolError {
    ProtocolError::InvalidParameter(text.to_string())
}

fn interval_report(probe: &Hmp155) -> String {
    let (value, unit) = probe.interval();
    field("Output intrv.", format!("{value} {}", unit.label()))
}

fn heat_report(probe: &Hmp155) -> String {
    let heat = probe.heat();
    let state = match (heat.enabled, probe.is_heating()) {
        (true, true) => "ON, heating",
        (enabled, _) => on_off(enabled),
    };
    [
        field("Extra heat", state),
        field("Heat RH limit", format!("{} %RH", heat.rh_limit)),
        field("Heat temp", format!("{} 'C", heat.temperature)),
        field("Heat time", format!("{} s", heat.time)),
    ]
    .join("\r\n")
}

fn info(probe: &Hmp155) -> String {
    [
        version(),
        field("Serial number", probe.serial()),
        field("Output format", probe.format_source()),
        field("Address", probe.address()),
        field("Serial mode", probe.smode().label()),
        interval_report(probe),
        field("Output units", probe.units().name()),
        heat_report(probe),
    ]
    .join("\r\n")
}

/// Store the given heating limits, each on its own. Returns the first limit out of range.
fn update_heat(
    heat: &mut ExtraHeat,
    update: [(Option<i64>, (i64, i64), &'static str); 3],
) -> Result<(), ProtocolError> {
    let mut failed = None;
    for (index, (value, (min, max), name)) in update.into_iter().enumerate() {
        let Some(value) = value else { continue };
        if !(min..=max).contains(&value) {
            failed.get_or_insert(ProtocolError::out_of_range(
                name,
                value as f64,
                min as f64,
                max as f64,
            ));
            continue;
        }
        let value = value as u8;
        match index {
            0 => heat.rh_limit = value,
            1 => heat.temperature = value,
            _ => heat.time = value,
        }
    }
    failed.map_or(Ok(()), Err)
}

impl Protocol for Hmp155Protocol {
    type Command = Command;
    type Device = Hmp155;

    fn name(&self) -> &'static str {
        "hmp155"
    }

    fn framing(&self) -> Framing {
        Framing::Line
    }

    fn parse(&self, frame: &[u8]) -> Result<Request<Command>, ProtocolError> {
        parse_line(frame)
    }

    fn apply(
        &self,
        probe: &mut Hmp155,
        request: &Request<Command>,
    ) -> Result<Outcome, ProtocolError> {
        let own_address = i64::from(probe.address());
        let own = |address: i64| address == own_address;
        match &request.command {
            Command::Send(Some(address)) => Ok(if own(*address) {
                Outcome::measurement()
            } else {
                Outcome::silent()
            }),
            Command::Open(address) => {
                probe.open = own(*address);
                if probe.open {
                    Ok(Outcome::text(format!(
                        "{MODEL}: {address} line opened for operator commands"
                    )))
                } else {
                    Ok(Outcome::silent())
                }
            }
            _ if !probe.is_listening() => Ok(Outcome::silent()),

            Command::Run => {
                probe.schedule_mut().set_mode(OutputMode::Continuous);
                Ok(Outcome::silent().with_wake())
            }
            Command::Stop => {
                let mode = if probe.smode() == SerialMode::Poll {
                    OutputMode::Polled
                } else {
                    OutputMode::Stopped
                };
                probe.schedule_mut().set_mode(mode);
                Ok(Outcome::silent().with_wake())
            }
            Command::Send(None) => Ok(Outcome::measurement()),

            Command::Smode(Setting::Query) => {
                Ok(Outcome::text(field("Serial mode", probe.smode().label())))
            }
            Command::Smode(Setting::Set(smode)) => {
                probe.set_smode(*smode);
                Ok(Outcome::text(field("Serial mode", smode.label())).with_wake())
            }

            Command::Intv(Setting::Query) => Ok(Outcome::text(interval_report(probe))),
            Command::Intv(Setting::Set((value, unit))) => {
                let value = u8::try_from(*value)
                    .ok()
                    .filter(|value| i64::from(*value) <= MAX_INTERVAL)
                    .ok_or_else(|| {
                        ProtocolError::out_of_range(
                            "interval",
                            *value as f64,
                            0,
                            MAX_INTERVAL as f64,
                        )
                    })?;
                probe.set_interval(value, *unit);
                Ok(Outcome::text(interval_report(probe)).with_wake())
            }

            Command::Form(Setting::Query) => {
                Ok(Outcome::text(field("Output format", probe.format_source())))
            }
            Command::Form(Setting::Set(source)) => {
                probe.format = Some(compile::<HmpVariable>(source)?);
                Ok(Outcome::text(field("Output format", source)))
            }
            Command::FormReset => {
                probe.format = None;
                Ok(Outcome::text(field("Output format", DEFAULT_FORMAT)))
            }

            Command::Addr(Setting::Query) => Ok(Outcome::text(field("Address", probe.address()))),
            Command::Addr(Setting::Set(address)) => {
                let address = u8::try_from(*address)
                    .ok()
                    .filter(|address| *address <= MAX_ADDRESS)
                    .ok_or_else(|| {
                        ProtocolError::out_of_range("address", *address as f64, 0, MAX_ADDRESS)
                    })?;
                Ok(Outcome::text(field("Address", address)).with_readdress(address))
            }

            Command::Close => {
                probe.open = false;
                Ok(Outcome::text("line closed"))
            }

            Command::Unit(Setting::Query) => {
                Ok(Outcome::text(field("Output units", probe.units().name())))
            }
            Command::Unit(Setting::Set(units)) => {
                probe.units = *units;
                Ok(Outcome::text(field("Output units", units.name())))
            }

            Command::Xheat(Setting::Query) => Ok(Outcome::text(heat_report(probe))),
            Command::Xheat(Setting::Set(HeatUpdate::Enable(enabled))) => {
                probe.heat.enabled = *enabled;
                debug!(heating = probe.is_heating(), "extra heat {}", on_off(*enabled));
                Ok(Outcome::text(heat_report(probe)))
            }
            Command::Xheat(Setting::Set(HeatUpdate::Limits {
                rh,
                temperature,
                time,
            })) => {
                update_heat(
                    &mut probe.heat,
                    [
                        (*rh, HEAT_RH_RANGE, "heat RH limit"),
                        (*temperature, HEAT_TEMPERATURE_RANGE, "heat temperature"),
                        (*time, HEAT_TIME_RANGE, "heat time"),
                    ],
                )?;
                Ok(Outcome::text(heat_report(probe)))
            }

            Command::Smode(Setting::Invalid(text))
            | Command::Intv(Setting::Invalid(text))
            | Command::Form(Setting::Invalid(text))
            | Command::Addr(Setting::Invalid(text))
            | Command::Unit(Setting::Invalid(text))
            | Command::Xheat(Setting::Invalid(text)) => Err(invalid(text)),

            Command::Snum => Ok(Outcome::text(field("Serial number", probe.serial()))),
            Command::Vers => Ok(Outcome::text(version())),
            Command::Info => Ok(Outcome::text(info(probe))),
            Command::Reset => {
                info!(address = probe.address(), "probe restarted");
                probe.restart();
                Ok(Outcome::text(version()).with_wake())
            }
            Command::Unknown(keyword) => Err(ProtocolError::UnknownCommand(keyword.clone())),
        }
    }

    fn encode_reply(&self, _: &Hmp155, _: &Request<Command>, body: &str) -> Vec<u8> {
        format!("{body}\r\n").into_bytes()
    }

    fn encode_error(
        &self,
        probe: Option<&Hmp155>,
        _: Option<&Request<Command>>,
        error: &ProtocolError,
    ) -> Option<Vec<u8>> {
        if !probe?.is_listening() {
            return None;
        }
        let message = match error {
            ProtocolError::UnknownCommand(_) => "Unknown command",
            ProtocolError::OutOfRange { .. } | ProtocolError::InvalidParameter(_) => {
                "Invalid setting"
            }
            ProtocolError::AddressInUse(_) => "Address in use",
            _ => return None,
        };
        Some(format!("{message}\r\n").into_bytes())
    }

    fn render_measurement(&self, probe: &Hmp155, timestamp: NaiveDateTime) -> Vec<u8> {
        let reading = probe.reading(timestamp);
        if let Some(format) = &probe.format {
            return format.evaluate(&reading).into_bytes();
        }
        compile::<HmpVariable>(DEFAULT_FORMAT)
            .map(|format| format.evaluate(&reading).into_bytes())
            .unwrap_or_else(|error| {
                warn!(%error, "factory format unavailable");
                Vec::new()
            })
    }
}
