//! Cutting a byte stream into frames.
//!
//! Two framing styles are used by the emulated families:
//! - Line framing: a frame is everything up to CR or LF. The line may carry an address prefix
//!   (`05:`) and a checksum suffix (`*2D`), see [`split_address_prefix`] and
//!   [`split_line_checksum`].
//! - Block framing: a frame starts with STX and ends with ETX. The block carries its CRC as the
//!   last field inside the block, see [`extract_block`].

use std::mem;

use tracing::warn;

use crate::ProtocolError;

/// Start of text.
pub const STX: u8 = 0x02;
/// End of text.
pub const ETX: u8 = 0x03;

/// Framing style of an instrument family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Frames are terminated by CR and/or LF.
    Line,
    /// Frames are delimited by STX and ETX.
    Block,
}

/// Accumulates bytes into lines.
///
/// CR and LF both terminate a line and empty lines are skipped, so CR, LF, and CRLF terminated
/// input all work. A line that grows beyond `max_len` is discarded up to the next terminator.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl LineFramer {
    /// Create a new line framer that accepts lines up to `max_len` bytes.
    pub fn new(max_len: usize) -> Self {
        LineFramer {
            buf: Vec::with_capacity(max_len),
            max_len,
            discarding: false,
        }
    }

    /// Push one byte. Returns the complete line, without terminator, when one is finished.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        match byte {
            b'\r' | b'\n' => {
                if self.discarding {
                    self.discarding = false;
                    return None;
                }
                if self.buf.is_empty() {
                    return None;
                }
                Some(mem::take(&mut self.buf))
            }
            _ if self.discarding => None,
            _ => {
                if self.buf.len() >= self.max_len {
                    warn!(max_len = self.max_len, "line overflow, discarding partial line");
                    self.buf.clear();
                    self.discarding = true;
                    return None;
                }
                self.buf.push(byte);
                None
            }
        }
    }
}

/// Accumulates bytes into STX ... ETX blocks.
///
/// Bytes outside of a block (e.g., CR/LF after ETX) are ignored. A second STX inside a block
/// restarts the block. Blocks longer than `max_len` are discarded.
#[derive(Debug)]
pub struct BlockFramer {
    buf: Vec<u8>,
    max_len: usize,
    in_block: bool,
}

impl BlockFramer {
    /// Create a new block framer that accepts blocks up to `max_len` bytes, STX and ETX included.
    pub fn new(max_len: usize) -> Self {
        BlockFramer {
            buf: Vec::with_capacity(max_len),
            max_len,
            in_block: false,
        }
    }

    /// Push one byte. Returns the complete block, STX and ETX included, when one is finished.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte == STX {
            self.buf.clear();
            self.buf.push(STX);
            self.in_block = true;
            return None;
        }
        if !self.in_block {
            return None;
        }
        if self.buf.len() >= self.max_len {
            warn!(max_len = self.max_len, "block overflow, discarding partial block");
            self.buf.clear();
            self.in_block = false;
            return None;
        }
        self.buf.push(byte);
        if byte == ETX {
            self.in_block = false;
            return Some(mem::take(&mut self.buf));
        }
        None
    }
}

/// A framer for either framing style.
#[derive(Debug)]
pub enum FrameAssembler {
    /// Line framing.
    Line(LineFramer),
    /// Block framing.
    Block(BlockFramer),
}

impl FrameAssembler {
    /// Create the framer that matches the given framing style.
    pub fn new(framing: Framing, max_len: usize) -> Self {
        match framing {
            Framing::Line => FrameAssembler::Line(LineFramer::new(max_len)),
            Framing::Block => FrameAssembler::Block(BlockFramer::new(max_len)),
        }
    }

    /// Push one byte, return a frame if one is complete.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        match self {
            FrameAssembler::Line(framer) => framer.push(byte),
            FrameAssembler::Block(framer) => framer.push(byte),
        }
    }
}

/// The content of an STX/ETX block, split into payload and CRC field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    /// Everything between STX and the separator in front of the CRC field.
    pub payload: &'a str,
    /// The bytes the CRC is calculated over: the payload plus the separator behind it.
    pub crc_span: &'a [u8],
    /// The CRC field as sent.
    pub crc_field: &'a str,
}

/// Extract payload and CRC field from a raw STX ... ETX block.
///
/// The first STX and the first ETX after it delimit the block. A separator directly in front of
/// ETX closes the CRC field and is dropped. The last separator before that one separates the
/// payload from the CRC field.
///
/// # Arguments
/// * `raw`: The raw bytes, usually as returned by [`BlockFramer::push`].
/// * `separator`: The field separator of the family, e.g., `b':'` or `b' '`.
pub fn extract_block(raw: &[u8], separator: u8) -> Result<Block<'_>, ProtocolError> {
    let stx = raw
        .iter()
        .position(|&b| b == STX)
        .ok_or_else(|| ProtocolError::MalformedFrame("missing STX".into()))?;
    let etx = raw[stx + 1..]
        .iter()
        .position(|&b| b == ETX)
        .map(|pos| pos + stx + 1)
        .ok_or_else(|| ProtocolError::MalformedFrame("missing ETX".into()))?;

    let mut inner = &raw[stx + 1..etx];
    if inner.last() == Some(&separator) {
        inner = &inner[..inner.len() - 1];
    }
    let sep_pos = inner
        .iter()
        .rposition(|&b| b == separator)
        .ok_or_else(|| ProtocolError::MalformedFrame("missing CRC separator".into()))?;

    let payload = std::str::from_utf8(&inner[..sep_pos])
        .map_err(|_| ProtocolError::MalformedFrame("payload is not valid text".into()))?;
    let crc_field = std::str::from_utf8(&inner[sep_pos + 1..])
        .map_err(|_| ProtocolError::MalformedFrame("CRC field is not valid text".into()))?;

    Ok(Block {
        payload,
        crc_span: &inner[..=sep_pos],
        crc_field,
    })
}

/// Build an STX/ETX block from a payload and its CRC field.
///
/// The result is `STX payload separator crc [trailer] ETX`, the CRC being rendered as four upper
/// case hex digits.
pub fn build_block(payload: &str, separator: u8, crc: u16, trailer: Option<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    out.push(STX);
    out.extend_from_slice(payload.as_bytes());
    out.push(separator);
    out.extend_from_slice(format!("{crc:04X}").as_bytes());
    if let Some(trailer) = trailer {
        out.push(trailer);
    }
    out.push(ETX);
    out
}

/// Split a leading `<digits>:` address segment off a line.
///
/// Returns the address, if any, and the rest of the line. Lines without a leading digit sequence
/// followed by a colon are returned unchanged. An address with too many digits is malformed.
pub fn split_address_prefix(line: &str) -> Result<(Option<u32>, &str), ProtocolError> {
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || line.as_bytes().get(digits) != Some(&b':') {
        return Ok((None, line));
    }
    let address = line[..digits]
        .parse::<u32>()
        .map_err(|_| ProtocolError::MalformedFrame(format!("address too long: {line}")))?;
    Ok((Some(address), &line[digits + 1..]))
}

/// Split a trailing checksum field off a line, e.g., `A,?*2D` into `A,?` and `2D`.
pub fn split_line_checksum(line: &str, marker: char) -> (&str, Option<&str>) {
    match line.rfind(marker) {
        Some(pos) => (&line[..pos], Some(&line[pos + marker.len_utf8()..])),
        None => (line, None),
    }
}
