//! Commands of the thunderstorm detector.
//!
//! A command is one STX/ETX block with space separated fields and a CRC token at the end:
//!
//! ```text
//! <STX>INTERVAL 60 1A2B<ETX>
//! ```
//!
//! The CRC is the complemented CRC-16/CCITT over every byte after STX up to and including the
//! space in front of the CRC token.

use wxemu::{
    ChecksumStatus, OutputMode, ProtocolError, Request, Target,
    checksum::{Crc16Convention, parse_hex_u16},
    framing::{build_block, extract_block},
    tokenizer::{KeywordTable, field_or, split_params},
};

use crate::device::RangeUnit;

/// How the CRC is calculated.
pub const CRC: Crc16Convention = Crc16Convention::Inverted;

/// Field separator.
pub const SEPARATOR: u8 = b' ';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Status,
    Mode,
    Interval,
    Poll,
    Msg,
    Range,
    Squelch,
    Reset,
    Id,
}

const KEYWORDS: KeywordTable<Keyword> = KeywordTable::new(&[
    ("STATUS", Keyword::Status),
    ("MODE", Keyword::Mode),
    ("INTERVAL", Keyword::Interval),
    ("POLL", Keyword::Poll),
    ("MSG", Keyword::Msg),
    ("RANGE", Keyword::Range),
    ("SQUELCH", Keyword::Squelch),
    ("RESET", Keyword::Reset),
    ("ID", Keyword::Id),
]);

/// All commands of the thunderstorm detector.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `STATUS`: report mode, interval, range unit, squelch, and message.
    Status,
    /// `MODE CONT|POLL|STOP`, `None` for an unknown mode.
    Mode(Option<OutputMode>),
    /// `INTERVAL <s>`, unparsable values are 0.
    Interval(i64),
    /// `POLL`: send a data message.
    Poll,
    /// `MSG <text>`: free text appended to every data message.
    Msg(String),
    /// `RANGE KM|MI|NM`, `None` for an unknown unit.
    Range(Option<RangeUnit>),
    /// `SQUELCH <0-15>`, unparsable values are 0.
    Squelch(i64),
    /// `RESET`: clear the strike counters.
    Reset,
    /// `ID`: model, serial number, and firmware.
    Id,
    /// Any other keyword.
    Unknown(String),
}

impl Command {
    /// The keyword as acknowledged in `ACK <KEYWORD>`.
    pub fn keyword(&self) -> &str {
        match self {
            Command::Status => "STATUS",
            Command::Mode(_) => "MODE",
            Command::Interval(_) => "INTERVAL",
            Command::Poll => "POLL",
            Command::Msg(_) => "MSG",
            Command::Range(_) => "RANGE",
            Command::Squelch(_) => "SQUELCH",
            Command::Reset => "RESET",
            Command::Id => "ID",
            Command::Unknown(keyword) => keyword,
        }
    }
}

/// Parse one raw block into a request.
pub fn parse_block(raw: &[u8]) -> Result<Request<Command>, ProtocolError> {
    let block = extract_block(raw, SEPARATOR)?;
    let received = parse_hex_u16(block.crc_field)
        .ok_or_else(|| ProtocolError::MalformedFrame(format!("bad CRC: {}", block.crc_field)))?;
    let calculated = CRC.checksum(block.crc_span);
    let checksum = if received == calculated {
        ChecksumStatus::Valid
    } else {
        ChecksumStatus::Invalid {
            received,
            calculated,
        }
    };

    let payload = block.payload.trim();
    if payload.is_empty() {
        return Err(ProtocolError::MalformedFrame("empty block".into()));
    }
    let command = match KEYWORDS.lookup(payload) {
        Some((keyword, tail)) => parse_command(keyword, tail),
        None => Command::Unknown(
            payload
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase(),
        ),
    };
    Ok(Request::new(Target::Default, command, payload).with_checksum(checksum))
}

fn parse_command(keyword: Keyword, tail: &str) -> Command {
    let params = split_params(tail, ' ');
    match keyword {
        Keyword::Status => Command::Status,
        Keyword::Mode => Command::Mode(params.first().and_then(|mode| {
            match mode.to_ascii_uppercase().as_str() {
                "CONT" => Some(OutputMode::Continuous),
                "POLL" => Some(OutputMode::Polled),
                "STOP" => Some(OutputMode::Stopped),
                _ => None,
            }
        })),
        Keyword::Interval => Command::Interval(field_or(&params, 0, 0)),
        Keyword::Poll => Command::Poll,
        Keyword::Msg => Command::Msg(tail.trim().to_string()),
        Keyword::Range => Command::Range(params.first().and_then(|unit| RangeUnit::from_label(unit))),
        Keyword::Squelch => Command::Squelch(field_or(&params, 0, 0)),
        Keyword::Reset => Command::Reset,
        Keyword::Id => Command::Id,
    }
}

/// Frame a payload: `<STX>payload CRC<ETX>`, followed by CR LF.
pub fn frame(payload: &str) -> Vec<u8> {
    let mut span = payload.as_bytes().to_vec();
    span.push(SEPARATOR);
    let mut out = build_block(payload, SEPARATOR, CRC.checksum(&span), None);
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use wxemu::framing::{ETX, STX};

    #[rstest]
    #[case("STATUS", Command::Status)]
    #[case("mode cont", Command::Mode(Some(OutputMode::Continuous)))]
    #[case("MODE SLEEP", Command::Mode(None))]
    #[case("MODE", Command::Mode(None))]
    #[case("INTERVAL 30", Command::Interval(30))]
    #[case("INTERVAL x", Command::Interval(0))]
    #[case("MSG  Tower 2 north ", Command::Msg("Tower 2 north".into()))]
    #[case("RANGE nm", Command::Range(Some(RangeUnit::NauticalMiles)))]
    #[case("SQUELCH 7", Command::Squelch(7))]
    #[case("RESET", Command::Reset)]
    #[case("ID", Command::Id)]
    #[case("IDENT", Command::Unknown("IDENT".into()))]
    fn test_parse_command(#[case] payload: &str, #[case] exp: Command) {
        let request = parse_block(&frame(payload)).unwrap();
        assert_eq!(request.command, exp);
        assert_eq!(request.checksum, ChecksumStatus::Valid);
    }

    #[rstest]
    fn test_crc_span() {
        // complemented CCITT over "POLL ", the trailing space included
        let crc = !wxemu::checksum::crc16_ccitt(b"POLL ");
        let mut raw = vec![STX];
        raw.extend_from_slice(format!("POLL {crc:04X}").as_bytes());
        raw.push(ETX);
        assert_eq!(raw, frame("POLL")[..raw.len()]);
        assert_eq!(parse_block(&raw).unwrap().checksum, ChecksumStatus::Valid);
    }

    #[rstest]
    fn test_invalid_crc() {
        let mut raw = frame("POLL");
        raw[1] = b'p';
        assert!(matches!(
            parse_block(&raw).unwrap().checksum,
            ChecksumStatus::Invalid { .. }
        ));
    }

    #[rstest]
    #[case(b"POLL 1234".to_vec())]
    #[case(vec![STX, b'P', b'O', b'L', b'L', ETX])]
    #[case(vec![STX, b'P', b' ', b'X', b'Y', ETX])]
    fn test_malformed(#[case] raw: Vec<u8>) {
        assert!(matches!(
            parse_block(&raw),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }
}
