//! Commands of the PTB330 and how they are parsed.
//!
//! Commands are plain text lines: a keyword followed by space separated parameters, e.g.,
//! `INTV 10 s` or `UNIT P mmHg`. A keyword without parameters queries the setting. There is no
//! checksum and no address prefix. Which barometer on a bus answers is decided by the barometer
//! itself, see [`crate::Ptb330`].

use wxemu::{
    ProtocolError, Request, Target,
    tokenizer::{KeywordTable, Setting, field, field_or, split_params},
    units::{PressureUnit, TemperatureUnit},
};

use crate::device::{IntervalUnit, Parity, SerialMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    R,
    S,
    Send,
    Smode,
    Intv,
    Form,
    Unit,
    Addr,
    Open,
    Close,
    Seri,
    Echo,
    Hhcp,
    Hqfe,
    Hqnh,
    Avrg,
    Pstab,
    Snum,
    Vers,
    Info,
    Errs,
    Reset,
}

const KEYWORDS: KeywordTable<Keyword> = KeywordTable::new(&[
    ("R", Keyword::R),
    ("S", Keyword::S),
    ("SEND", Keyword::Send),
    ("SMODE", Keyword::Smode),
    ("INTV", Keyword::Intv),
    ("FORM", Keyword::Form),
    ("UNIT", Keyword::Unit),
    ("ADDR", Keyword::Addr),
    ("OPEN", Keyword::Open),
    ("CLOSE", Keyword::Close),
    ("SERI", Keyword::Seri),
    ("ECHO", Keyword::Echo),
    ("HHCP", Keyword::Hhcp),
    ("HQFE", Keyword::Hqfe),
    ("HQNH", Keyword::Hqnh),
    ("AVRG", Keyword::Avrg),
    ("PSTAB", Keyword::Pstab),
    ("SNUM", Keyword::Snum),
    ("VERS", Keyword::Vers),
    ("?", Keyword::Info),
    ("ERRS", Keyword::Errs),
    ("RESET", Keyword::Reset),
]);

/// A new output interval, `INTV <n> <unit>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalUpdate {
    /// Number of units, unparsable values are 0.
    pub value: i64,
    /// The time unit, seconds if none is given.
    pub unit: IntervalUnit,
}

/// A new unit, `UNIT [P|T] <unit>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitUpdate {
    /// Unit of all pressure variables.
    Pressure(PressureUnit),
    /// Unit of all temperature variables.
    Temperature(TemperatureUnit),
}

/// New serial line settings, `SERI [baud] [parity] [data] [stop]`. Missing fields stay as they
/// are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineUpdate {
    /// Baud rate, unparsable values are 0.
    pub baud: Option<i64>,
    /// Parity, `None` inside for an unknown parity letter.
    pub parity: Option<Option<Parity>>,
    /// Data bits, unparsable values are 0.
    pub data_bits: Option<i64>,
    /// Stop bits, unparsable values are 0.
    pub stop_bits: Option<i64>,
}

/// The reference heights of the barometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Height {
    /// `HHCP`: height of the height corrected pressure.
    Hcp,
    /// `HQFE`: height of the QFE reference level.
    Qfe,
    /// `HQNH`: station height for the QNH reduction.
    Qnh,
}

/// All commands of the PTB330.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `R`: start continuous output.
    Run,
    /// `S`: stop continuous output.
    Stop,
    /// `SEND [addr]`: send one measurement. In POLL mode the address is required.
    Send(Option<i64>),
    /// `SMODE [STOP|RUN|POLL|SEND]`
    Smode(Setting<SerialMode>),
    /// `INTV [n [s|min|h]]`
    Intv(Setting<IntervalUpdate>),
    /// `FORM [format]`
    Form(Setting<String>),
    /// `FORM /`: back to the factory format.
    FormReset,
    /// `UNIT [P|T] [unit]`
    Unit(Setting<UnitUpdate>),
    /// `ADDR [0-255]`
    Addr(Setting<i64>),
    /// `OPEN addr`: open a barometer in POLL mode for commands.
    Open(i64),
    /// `CLOSE`: close the line again.
    Close,
    /// `SERI [baud parity data stop]`
    Seri(Setting<LineUpdate>),
    /// `ECHO [ON|OFF]`
    Echo(Setting<bool>),
    /// `HHCP`, `HQFE`, or `HQNH` with an optional height in m.
    Height(Height, Setting<f64>),
    /// `AVRG [s]`: averaging time.
    Avrg(Setting<f64>),
    /// `PSTAB [hPa]`: limit of the pressure stability indicator.
    Pstab(Setting<f64>),
    /// `SNUM`: serial number.
    Snum,
    /// `VERS`: model and firmware version.
    Vers,
    /// `?`: all settings.
    Info,
    /// `ERRS`: active errors.
    Errs,
    /// `RESET`: restart the barometer.
    Reset,
    /// Any other keyword.
    Unknown(String),
}

/// Parse one command line into a request. Every barometer on the line sees every command.
pub fn parse_line(frame: &[u8]) -> Result<Request<Command>, ProtocolError> {
    let line = std::str::from_utf8(frame)
        .map_err(|_| ProtocolError::MalformedFrame("line is not valid text".into()))?
        .trim();
    if line.is_empty() {
        return Err(ProtocolError::MalformedFrame("empty line".into()));
    }

    let command = match KEYWORDS.lookup(line) {
        Some((keyword, tail)) => parse_command(keyword, tail),
        None => Command::Unknown(
            line.split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase(),
        ),
    };
    Ok(Request::new(Target::All, command, line))
}

fn parse_command(keyword: Keyword, tail: &str) -> Command {
    let params = split_params(tail, ' ');
    match keyword {
        Keyword::R => Command::Run,
        Keyword::S => Command::Stop,
        Keyword::Send => Command::Send(field(&params, 0)),
        Keyword::Smode => Command::Smode(Setting::parse(&params, |params| {
            SerialMode::from_label(params[0])
        })),
        Keyword::Intv => Command::Intv(Setting::parse(&params, |params| {
            let unit = match params.get(1) {
                Some(label) => IntervalUnit::from_label(label)?,
                None => IntervalUnit::Seconds,
            };
            Some(IntervalUpdate {
                value: field_or(params, 0, 0),
                unit,
            })
        })),
        Keyword::Form if tail.trim() == "/" => Command::FormReset,
        Keyword::Form => Command::Form(Setting::parse(&params, |_| Some(tail.trim().to_string()))),
        Keyword::Unit => Command::Unit(Setting::parse(&params, parse_unit)),
        Keyword::Addr => Command::Addr(Setting::parse(&params, |params| Some(field_or(params, 0, 0)))),
        Keyword::Open => Command::Open(field_or(&params, 0, 0)),
        Keyword::Close => Command::Close,
        Keyword::Seri => Command::Seri(Setting::parse(&params, |params| {
            Some(LineUpdate {
                baud: params.first().map(|_| field_or(params, 0, 0)),
                parity: params.get(1).map(|p| Parity::from_label(p)),
                data_bits: params.get(2).map(|_| field_or(params, 2, 0)),
                stop_bits: params.get(3).map(|_| field_or(params, 3, 0)),
            })
        })),
        Keyword::Echo => Command::Echo(Setting::parse(&params, |params| {
            match params[0].to_ascii_uppercase().as_str() {
                "ON" => Some(true),
                "OFF" => Some(false),
                _ => None,
            }
        })),
        Keyword::Hhcp => Command::Height(Height::Hcp, number(&params)),
        Keyword::Hqfe => Command::Height(Height::Qfe, number(&params)),
        Keyword::Hqnh => Command::Height(Height::Qnh, number(&params)),
        Keyword::Avrg => Command::Avrg(number(&params)),
        Keyword::Pstab => Command::Pstab(number(&params)),
        Keyword::Snum => Command::Snum,
        Keyword::Vers => Command::Vers,
        Keyword::Info => Command::Info,
        Keyword::Errs => Command::Errs,
        Keyword::Reset => Command::Reset,
    }
}

fn number(params: &[&str]) -> Setting<f64> {
    Setting::parse(params, |params| Some(field_or(params, 0, 0.0)))
}

fn parse_unit(params: &[&str]) -> Option<UnitUpdate> {
    let pressure = |label: &str| PressureUnit::from_label(label).map(UnitUpdate::Pressure);
    let temperature = |label: &str| TemperatureUnit::from_label(label).map(UnitUpdate::Temperature);
    match params {
        [quantity, label] if quantity.eq_ignore_ascii_case("P") => pressure(label),
        [quantity, label] if quantity.eq_ignore_ascii_case("T") => temperature(label),
        [label] => pressure(label).or_else(|| temperature(label)),
        _ => None,
    }
}
