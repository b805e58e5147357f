//! Commands of the line barometer and how they are parsed.
//!
//! A command line looks like `[NN:]X[,p1[,p2...]][*HH]`:
//! - `NN:` is the optional bus address (0 to 98).
//! - `X` is a single command letter, case-insensitive.
//! - Parameters are comma separated. A single `?` queries the current setting.
//! - `*HH` is an optional XOR checksum over everything in front of `*`, as two hex digits.

use std::str::FromStr;

use wxemu::{
    ChecksumStatus, ProtocolError, Request, Target,
    checksum::{parse_hex_u8, xor_checksum},
    framing::{split_address_prefix, split_line_checksum},
    tokenizer::{KeywordTable, is_query, split_params},
};

/// Highest bus address.
pub const MAX_ADDRESS: u8 = 98;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Letter {
    A,
    N,
    U,
    F,
    C,
    K,
    P,
    R,
    S,
    I,
}

const LETTERS: KeywordTable<Letter> = KeywordTable::new(&[
    ("A", Letter::A),
    ("N", Letter::N),
    ("U", Letter::U),
    ("F", Letter::F),
    ("C", Letter::C),
    ("K", Letter::K),
    ("P", Letter::P),
    ("R", Letter::R),
    ("S", Letter::S),
    ("I", Letter::I),
])
.with_boundaries(&[',']);

/// All commands of the line barometer.
///
/// Numeric parameters that are present but cannot be parsed are taken as 0 and then go through
/// the regular range check. Missing parameters leave the setting unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `A,?`: query auto-send format and interval.
    QueryAutoSend,
    /// `A,<fmt>,<interval>`: set auto-send format (0-12) and interval (0-9999 s).
    AutoSend {
        /// Output format.
        format: Option<i64>,
        /// Interval in seconds.
        interval: Option<f64>,
    },
    /// `N,?`: query the address.
    QueryAddress,
    /// `N,<addr>`: change the address (0-98).
    SetAddress(i64),
    /// `U,?`: query the pressure unit.
    QueryUnit,
    /// `U,<code>`: set the pressure unit.
    SetUnit(i64),
    /// `F,?`: query the averaging filter.
    QueryFilter,
    /// `F,<n>`: average over the last `n` samples (0-99).
    SetFilter(i64),
    /// `C,?`: query checksum mode.
    QueryChecksum,
    /// `C,<0|1>`: disable or enable checksums.
    SetChecksum(i64),
    /// `K,<pin>,<point>,<value>`: calibrate offset (point 1) or gain (point 2).
    Calibrate {
        /// PIN, must match the PIN of the device.
        pin: i64,
        /// Calibration point.
        point: i64,
        /// Calibration value.
        value: f64,
    },
    /// `P`: poll one measurement.
    Poll,
    /// `R`: resume auto-send output.
    Resume,
    /// `S`: stop auto-send output.
    Stop,
    /// `I`: identify.
    Identify,
    /// Any other command. Answered with an error by the addressed device.
    Unknown(String),
}

/// Parse one command line into a request.
pub fn parse_line(frame: &[u8]) -> Result<Request<Command>, ProtocolError> {
    let line = std::str::from_utf8(frame)
        .map_err(|_| ProtocolError::MalformedFrame("line is not valid text".into()))?
        .trim();

    let (body, checksum_field) = split_line_checksum(line, '*');
    let checksum = match checksum_field {
        None => ChecksumStatus::Absent,
        Some(field) => {
            let received = parse_hex_u8(field)
                .ok_or_else(|| ProtocolError::MalformedFrame(format!("bad checksum: {field}")))?;
            let calculated = xor_checksum(body.as_bytes());
            if received == calculated {
                ChecksumStatus::Valid
            } else {
                ChecksumStatus::Invalid {
                    received: received.into(),
                    calculated: calculated.into(),
                }
            }
        }
    };

    let (address, rest) = split_address_prefix(body)?;
    let target = match address {
        None => Target::All,
        Some(address) if address <= MAX_ADDRESS.into() => Target::Address(address as u8),
        Some(address) => return Err(ProtocolError::AddressOutOfRange(address)),
    };

    let command = match LETTERS.lookup(rest) {
        Some((letter, tail)) => parse_command(letter, &split_params(tail, ',')),
        None => Command::Unknown(rest.trim().to_string()),
    };
    Ok(Request::new(target, command, line).with_checksum(checksum))
}

fn parse_command(letter: Letter, params: &[&str]) -> Command {
    let query = params.len() == 1 && is_query(params[0]);
    match letter {
        Letter::A if query || params.is_empty() => Command::QueryAutoSend,
        Letter::A => Command::AutoSend {
            format: lenient(params, 0),
            interval: lenient(params, 1),
        },
        Letter::N if query || params.is_empty() => Command::QueryAddress,
        Letter::N => Command::SetAddress(lenient(params, 0).unwrap_or_default()),
        Letter::U if query || params.is_empty() => Command::QueryUnit,
        Letter::U => Command::SetUnit(lenient(params, 0).unwrap_or_default()),
        Letter::F if query || params.is_empty() => Command::QueryFilter,
        Letter::F => Command::SetFilter(lenient(params, 0).unwrap_or_default()),
        Letter::C if query || params.is_empty() => Command::QueryChecksum,
        Letter::C => Command::SetChecksum(lenient(params, 0).unwrap_or_default()),
        Letter::K => Command::Calibrate {
            pin: lenient(params, 0).unwrap_or_default(),
            point: lenient(params, 1).unwrap_or_default(),
            value: lenient(params, 2).unwrap_or_default(),
        },
        Letter::P => Command::Poll,
        Letter::R => Command::Resume,
        Letter::S => Command::Stop,
        Letter::I => Command::Identify,
    }
}

/// `None` for a missing or empty field, the parsed value or the default otherwise.
fn lenient<T: FromStr + Default>(params: &[&str], idx: usize) -> Option<T> {
    let field = params.get(idx)?.trim();
    if field.is_empty() {
        return None;
    }
    Some(field.parse().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn command(line: &str) -> Command {
        parse_line(line.as_bytes()).unwrap().command
    }

    #[rstest]
    #[case("A,?", Command::QueryAutoSend)]
    #[case("a,1,2.50", Command::AutoSend { format: Some(1), interval: Some(2.5) })]
    #[case("A,,10", Command::AutoSend { format: None, interval: Some(10.0) })]
    #[case("A,x,1", Command::AutoSend { format: Some(0), interval: Some(1.0) })]
    #[case("N,7", Command::SetAddress(7))]
    #[case("N", Command::QueryAddress)]
    #[case("K,1234,1,-0.5", Command::Calibrate { pin: 1234, point: 1, value: -0.5 })]
    #[case("P", Command::Poll)]
    #[case("R", Command::Resume)]
    #[case("s", Command::Stop)]
    #[case("RX", Command::Unknown("RX".into()))]
    #[case("Z,1", Command::Unknown("Z,1".into()))]
    fn test_parse_command(#[case] line: &str, #[case] exp: Command) {
        assert_eq!(command(line), exp);
    }

    #[rstest]
    #[case("A,?", Target::All)]
    #[case("05:A,?", Target::Address(5))]
    #[case("98:P", Target::Address(98))]
    fn test_parse_target(#[case] line: &str, #[case] exp: Target) {
        assert_eq!(parse_line(line.as_bytes()).unwrap().target, exp);
    }

    #[rstest]
    fn test_address_out_of_range() {
        assert_eq!(
            parse_line(b"99:P"),
            Err(ProtocolError::AddressOutOfRange(99))
        );
    }

    #[rstest]
    fn test_checksum_status() {
        let cs = xor_checksum(b"05:A,?");
        let valid = parse_line(format!("05:A,?*{cs:02X}").as_bytes()).unwrap();
        assert_eq!(valid.checksum, ChecksumStatus::Valid);
        assert_eq!(valid.command, Command::QueryAutoSend);

        let invalid = parse_line(format!("05:A,?*{:02x}", cs ^ 1).as_bytes()).unwrap();
        assert_eq!(
            invalid.checksum,
            ChecksumStatus::Invalid {
                received: (cs ^ 1).into(),
                calculated: cs.into()
            }
        );

        assert!(matches!(
            parse_line(b"05:A,?*XYZ"),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }
}
