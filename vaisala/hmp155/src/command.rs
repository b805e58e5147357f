//! Commands of the HMP155.
//!
//! The probe shares the command style of the other Vaisala instruments: one keyword per line,
//! parameters separated by spaces, no parameters to query a setting.

use wxemu::{
    ProtocolError, Request, Target,
    tokenizer::{KeywordTable, Setting, field, field_or, split_params},
};

use crate::device::{IntervalUnit, SerialMode, UnitSystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    R,
    S,
    Send,
    Smode,
    Intv,
    Form,
    Addr,
    Open,
    Close,
    Unit,
    Xheat,
    Snum,
    Vers,
    Info,
    Reset,
}

const KEYWORDS: KeywordTable<Keyword> = KeywordTable::new(&[
    ("R", Keyword::R),
    ("S", Keyword::S),
    ("SEND", Keyword::Send),
    ("SMODE", Keyword::Smode),
    ("INTV", Keyword::Intv),
    ("FORM", Keyword::Form),
    ("ADDR", Keyword::Addr),
    ("OPEN", Keyword::Open),
    ("CLOSE", Keyword::Close),
    ("UNIT", Keyword::Unit),
    ("XHEAT", Keyword::Xheat),
    ("SNUM", Keyword::Snum),
    ("VERS", Keyword::Vers),
    ("?", Keyword::Info),
    ("RESET", Keyword::Reset),
]);

/// Changes to the extra heating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatUpdate {
    /// `XHEAT ON` or `XHEAT OFF`
    Enable(bool),
    /// `XHEAT <rh> <temp> <time>`, trailing fields may be left out.
    Limits {
        /// RH in % at which the heating starts.
        rh: Option<i64>,
        /// Heating temperature in °C.
        temperature: Option<i64>,
        /// Heating time in s.
        time: Option<i64>,
    },
}

/// All commands of the HMP155.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `R`: start continuous output.
    Run,
    /// `S`: stop continuous output.
    Stop,
    /// `SEND [addr]`: send one measurement.
    Send(Option<i64>),
    /// `SMODE [STOP|RUN|POLL|SEND]`
    Smode(Setting<SerialMode>),
    /// `INTV [n [s|min|h]]`, the number and the unit.
    Intv(Setting<(i64, IntervalUnit)>),
    /// `FORM [format]`
    Form(Setting<String>),
    /// `FORM /`
    FormReset,
    /// `ADDR [0-99]`
    Addr(Setting<i64>),
    /// `OPEN addr`
    Open(i64),
    /// `CLOSE`
    Close,
    /// `UNIT [M|N]`
    Unit(Setting<UnitSystem>),
    /// `XHEAT [ON|OFF]` or `XHEAT <rh> <temp> <time>`
    Xheat(Setting<HeatUpdate>),
    /// `SNUM`
    Snum,
    /// `VERS`
    Vers,
    /// `?`
    Info,
    /// `RESET`
    Reset,
    /// Anything else, with the first word in upper case.
    Unknown(String),
}

/// Parse one command line. Every probe on the line sees every command.
pub fn parse_line(frame: &[u8]) -> Result<Request<Command>, ProtocolError> {
    let line = std::str::from_utf8(frame)
        .map_err(|_| ProtocolError::MalformedFrame("line is not valid text".into()))?
        .trim();
    if line.is_empty() {
        return Err(ProtocolError::MalformedFrame("empty line".into()));
    }

    let command = match KEYWORDS.lookup(line) {
        Some((keyword, tail)) => parse_command(keyword, tail),
        None => {
            let word = line.split_whitespace().next().unwrap_or_default();
            Command::Unknown(word.to_ascii_uppercase())
        }
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
            let unit = params
                .get(1)
                .map_or(Some(IntervalUnit::Seconds), |label| {
                    IntervalUnit::from_label(label)
                })?;
            Some((field_or(params, 0, 0), unit))
        })),
        Keyword::Form if tail.trim() == "/" => Command::FormReset,
        Keyword::Form => Command::Form(Setting::parse(&params, |_| Some(tail.trim().to_string()))),
        Keyword::Addr => Command::Addr(Setting::parse(&params, |params| field(params, 0))),
        Keyword::Open => Command::Open(field_or(&params, 0, -1)),
        Keyword::Close => Command::Close,
        Keyword::Unit => Command::Unit(Setting::parse(&params, |params| match params {
            [label] => UnitSystem::from_label(label),
            _ => None,
        })),
        Keyword::Xheat => Command::Xheat(Setting::parse(&params, parse_heat)),
        Keyword::Snum => Command::Snum,
        Keyword::Vers => Command::Vers,
        Keyword::Info => Command::Info,
        Keyword::Reset => Command::Reset,
    }
}

fn parse_heat(params: &[&str]) -> Option<HeatUpdate> {
    match params {
        [switch] if switch.eq_ignore_ascii_case("ON") => Some(HeatUpdate::Enable(true)),
        [switch] if switch.eq_ignore_ascii_case("OFF") => Some(HeatUpdate::Enable(false)),
        _ if params.len() <= 3 => {
            let mut limits = [None; 3];
            for (limit, param) in limits.iter_mut().zip(params) {
                *limit = Some(param.parse::<i64>().ok()?);
            }
            let [rh, temperature, time] = limits;
            Some(HeatUpdate::Limits {
                rh,
                temperature,
                time,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn command(line: &str) -> Command {
        parse_line(line.as_bytes()).unwrap().command
    }

    #[rstest]
    #[case("r", Command::Run)]
    #[case("SEND 12", Command::Send(Some(12)))]
    #[case("SMODE poll", Command::Smode(Setting::Set(SerialMode::Poll)))]
    #[case("INTV 30 min", Command::Intv(Setting::Set((30, IntervalUnit::Minutes))))]
    #[case("INTV ?", Command::Intv(Setting::Query))]
    #[case("FORM /", Command::FormReset)]
    #[case("FORM TD", Command::Form(Setting::Set("TD".into())))]
    #[case("ADDR 7", Command::Addr(Setting::Set(7)))]
    #[case("ADDR seven", Command::Addr(Setting::Invalid("seven".into())))]
    #[case("OPEN", Command::Open(-1))]
    #[case("UNIT n", Command::Unit(Setting::Set(UnitSystem::NonMetric)))]
    #[case("UNIT X", Command::Unit(Setting::Invalid("X".into())))]
    #[case("XHEAT on", Command::Xheat(Setting::Set(HeatUpdate::Enable(true))))]
    #[case("XHEAT", Command::Xheat(Setting::Query))]
    #[case("XHEAT 90 120", Command::Xheat(Setting::Set(HeatUpdate::Limits {
        rh: Some(90),
        temperature: Some(120),
        time: None,
    })))]
    #[case("XHEAT 90 hot", Command::Xheat(Setting::Invalid("90 hot".into())))]
    #[case("XHEAT 1 2 3 4", Command::Xheat(Setting::Invalid("1 2 3 4".into())))]
    #[case("VERS", Command::Vers)]
    #[case("CALIB", Command::Unknown("CALIB".into()))]
    fn test_parse_command(#[case] line: &str, #[case] exp: Command) {
        assert_eq!(command(line), exp);
    }

    #[rstest]
    fn test_request_keeps_line() {
        let request = parse_line(b"  xheat on \r").unwrap();
        assert_eq!(request.target, Target::All);
        assert_eq!(request.text, "xheat on");
    }

    #[rstest]
    fn test_empty_line() {
        assert!(matches!(
            parse_line(b"\r"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }
}
