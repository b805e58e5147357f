//! Checksums used by the emulated instrument families.
//!
//! All functions in here are pure: the same bytes always give the same checksum. Families pick
//! the algorithm, the covered byte range, and the rendering themselves.

use crc::{CRC_16_IBM_3740, CRC_16_XMODEM, Crc};

/// CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no reflection, no final XOR.
const CRC_CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC-16/XMODEM: polynomial 0x1021, initial value 0x0000.
const CRC_XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// How a family uses the CRC-16/CCITT value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crc16Convention {
    /// The calculated value is sent as is.
    Direct,
    /// The calculated value is complemented before it is sent.
    Inverted,
}

impl Crc16Convention {
    /// Calculate the CRC of `data` following this convention.
    pub fn checksum(&self, data: &[u8]) -> u16 {
        match self {
            Crc16Convention::Direct => crc16_ccitt(data),
            Crc16Convention::Inverted => crc16_ccitt_inverted(data),
        }
    }
}

/// XOR of all bytes. Returns 0 for an empty slice.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Sum of all bytes, modulo 256.
pub fn sum_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// CRC-16/CCITT with initial value 0xFFFF. An empty slice gives 0xFFFF.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    CRC_CCITT.checksum(data)
}

/// Complemented CRC-16/CCITT. An empty slice gives 0x0000.
pub fn crc16_ccitt_inverted(data: &[u8]) -> u16 {
    !crc16_ccitt(data)
}

/// CRC-16/XMODEM (initial value 0x0000).
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    CRC_XMODEM.checksum(data)
}

fn is_hex(field: &str) -> bool {
    field.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse a hexadecimal CRC-16 field, as sent by the host. Case-insensitive, 1 to 4 digits.
pub fn parse_hex_u16(field: &str) -> Option<u16> {
    let field = field.trim();
    if field.is_empty() || field.len() > 4 || !is_hex(field) {
        return None;
    }
    u16::from_str_radix(field, 16).ok()
}

/// Parse a hexadecimal 8-bit checksum field. Case-insensitive, 1 or 2 digits.
pub fn parse_hex_u8(field: &str) -> Option<u8> {
    let field = field.trim();
    if field.is_empty() || field.len() > 2 || !is_hex(field) {
        return None;
    }
    u8::from_str_radix(field, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(b"", 0x00)]
    #[case(b"A", 0x41)]
    #[case(b"AB", 0x03)]
    #[case(b"1013.25,", 0x06)]
    fn test_xor_checksum(#[case] data: &[u8], #[case] exp: u8) {
        assert_eq!(xor_checksum(data), exp);
    }

    #[rstest]
    fn test_sum_checksum_wraps() {
        assert_eq!(sum_checksum(b""), 0);
        assert_eq!(sum_checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(sum_checksum(b"AB"), 0x83);
    }

    #[rstest]
    fn test_crc16_check_values() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
        assert_eq!(crc16_xmodem(b"123456789"), 0x31C3);
        assert_eq!(crc16_ccitt_inverted(b"123456789"), !0x29B1);
    }

    #[rstest]
    fn test_crc16_empty() {
        assert_eq!(crc16_ccitt(b""), 0xFFFF);
        assert_eq!(crc16_ccitt_inverted(b""), 0x0000);
        assert_eq!(crc16_xmodem(b""), 0x0000);
    }

    #[rstest]
    fn test_convention_dispatch() {
        let data = b"GET:0:0:";
        assert_eq!(Crc16Convention::Direct.checksum(data), crc16_ccitt(data));
        assert_eq!(Crc16Convention::Inverted.checksum(data), !crc16_ccitt(data));
    }

    #[rstest]
    #[case("29B1", Some(0x29B1))]
    #[case("29b1", Some(0x29B1))]
    #[case("1", Some(0x0001))]
    #[case("", None)]
    #[case("12345", None)]
    #[case("ZZZZ", None)]
    #[case("+ABC", None)]
    #[case("-1", None)]
    fn test_parse_hex_u16(#[case] field: &str, #[case] exp: Option<u16>) {
        assert_eq!(parse_hex_u16(field), exp);
    }

    #[rstest]
    fn test_parse_hex_u8() {
        assert_eq!(parse_hex_u8("2d"), Some(0x2D));
        assert_eq!(parse_hex_u8("123"), None);
        assert_eq!(parse_hex_u8("+F"), None);
    }
}
