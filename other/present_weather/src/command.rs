//! Commands of the present-weather sensor and how they are parsed.
//!
//! Every command is one STX/ETX block of colon separated fields:
//!
//! ```text
//! <STX>KEYWORD:id:param1:...:paramN:CRC:<ETX>
//! ```
//!
//! The CRC is a CRC-16/CCITT over everything from the keyword up to and including the colon in
//! front of the CRC field, sent as four hex digits. If CRC checking is disabled on the sensor,
//! the host may send `0000` instead.

use wxemu::{
    ChecksumStatus, ProtocolError, Request, Target,
    checksum::{Crc16Convention, parse_hex_u16},
    framing::extract_block,
    tokenizer::{KeywordTable, field},
};

/// How the CRC is calculated.
pub const CRC: Crc16Convention = Crc16Convention::Direct;

/// Field separator.
pub const SEPARATOR: u8 = b':';

/// Highest sensor id.
pub const MAX_ID: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Get,
    Set,
    SetNc,
    MsgSet,
    Poll,
    Cal,
    Reset,
}

const KEYWORDS: KeywordTable<Keyword> = KeywordTable::new(&[
    ("GET", Keyword::Get),
    ("SET", Keyword::Set),
    ("SETNC", Keyword::SetNc),
    ("MSGSET", Keyword::MsgSet),
    ("POLL", Keyword::Poll),
    ("CAL", Keyword::Cal),
    ("RESET", Keyword::Reset),
]);

/// The eight settings fields of `SET` and `SETNC`, in wire order. `None` for fields that are
/// missing or do not parse, these keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    /// Sensor id, 0-9.
    pub id: Option<i64>,
    /// Message interval in s, 0-3600.
    pub interval: Option<i64>,
    /// Message format, 0 standard or 1 custom.
    pub format: Option<i64>,
    /// Output mode, 0 polled or 1 continuous.
    pub mode: Option<i64>,
    /// Baud rate code, 0-7.
    pub baud: Option<i64>,
    /// Visibility units, 0 m or 1 ft.
    pub units: Option<i64>,
    /// Averaging time in minutes, 1 or 10.
    pub averaging: Option<i64>,
    /// CRC checking, 0 or 1.
    pub crc_check: Option<i64>,
}

impl SettingsUpdate {
    fn from_fields(fields: &[&str]) -> Self {
        SettingsUpdate {
            id: field(fields, 0),
            interval: field(fields, 1),
            format: field(fields, 2),
            mode: field(fields, 3),
            baud: field(fields, 4),
            units: field(fields, 5),
            averaging: field(fields, 6),
            crc_check: field(fields, 7),
        }
    }
}

/// All commands of the present-weather sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `GET:id:0:` read the active settings.
    Get,
    /// `SET:id:f1:...:f8:` change and commit the settings.
    Set(SettingsUpdate),
    /// `SETNC:id:f1:...:f8:` change the settings without committing them.
    SetNoCommit(SettingsUpdate),
    /// `MSGSET:id:mask:` select the fields of the custom message, mask in hex.
    MsgSet(Option<u32>),
    /// `POLL:id:0:` request a data message.
    Poll,
    /// `CAL:id:pin:point:value:` calibrate the window contamination zero (point 1) or span
    /// (point 2).
    Calibrate {
        /// PIN.
        pin: i64,
        /// Calibration point.
        point: i64,
        /// Calibration value.
        value: f64,
    },
    /// `RESET:id:0:` revert the active settings to the committed ones.
    Reset,
    /// An unknown keyword.
    Unknown(String),
}

/// Parse one raw block into a request.
pub fn parse_block(raw: &[u8]) -> Result<Request<Command>, ProtocolError> {
    let block = extract_block(raw, SEPARATOR)?;
    let received = parse_hex_u16(block.crc_field)
        .ok_or_else(|| ProtocolError::MalformedFrame(format!("bad CRC: {}", block.crc_field)))?;
    let calculated = CRC.checksum(block.crc_span);
    let checksum = if received == calculated {
        ChecksumStatus::Valid
    } else if received == 0 {
        ChecksumStatus::Absent
    } else {
        ChecksumStatus::Invalid {
            received,
            calculated,
        }
    };

    let fields: Vec<&str> = block.payload.split(':').map(str::trim).collect();
    let (keyword, id, params) = match fields.as_slice() {
        [keyword, id, params @ ..] => (*keyword, *id, params),
        _ => return Err(ProtocolError::MalformedFrame("missing id".into())),
    };
    let id: u32 = id
        .parse()
        .map_err(|_| ProtocolError::MalformedFrame(format!("bad id: {id}")))?;
    if id > u32::from(MAX_ID) {
        return Err(ProtocolError::AddressOutOfRange(id));
    }

    let command = match KEYWORDS.lookup(keyword) {
        Some((keyword, rest)) if rest.is_empty() => parse_command(keyword, params),
        _ => Command::Unknown(keyword.to_string()),
    };
    Ok(Request::new(Target::Address(id as u8), command, block.payload).with_checksum(checksum))
}

fn parse_command(keyword: Keyword, params: &[&str]) -> Command {
    match keyword {
        Keyword::Get => Command::Get,
        Keyword::Set => Command::Set(SettingsUpdate::from_fields(params)),
        Keyword::SetNc => Command::SetNoCommit(SettingsUpdate::from_fields(params)),
        Keyword::MsgSet => Command::MsgSet(
            params
                .first()
                .and_then(|mask| u32::from_str_radix(mask, 16).ok()),
        ),
        Keyword::Poll => Command::Poll,
        Keyword::Cal => Command::Calibrate {
            pin: field(params, 0).unwrap_or_default(),
            point: field(params, 1).unwrap_or_default(),
            value: field(params, 2).unwrap_or_default(),
        },
        Keyword::Reset => Command::Reset,
    }
}

/// Frame a payload: `<STX>payload:CRC:<ETX>`, followed by CR LF.
pub fn frame(payload: &str) -> Vec<u8> {
    let mut span = Vec::with_capacity(payload.len() + 1);
    span.extend_from_slice(payload.as_bytes());
    span.push(SEPARATOR);
    let mut out =
        wxemu::framing::build_block(payload, SEPARATOR, CRC.checksum(&span), Some(SEPARATOR));
    out.extend_from_slice(b"\r\n");
    out
}
