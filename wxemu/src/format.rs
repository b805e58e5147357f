//! The output format language of `FORM`-style commands.
//!
//! A format string is compiled once, when the host sends it, into a list of [`FormatItem`]s. The
//! compiled format is then evaluated for every message against the current measurement snapshot.
//!
//! # Format grammar
//!
//! The format string is scanned from left to right. At every position the first of the following
//! rules that matches wins:
//!
//! 1. A digit sequence, optionally followed by `.` and more digits, sets width and precision of
//!    the next variable. `4.1 RH` renders the humidity in 4 characters with one decimal.
//!    Without such a prefix, numbers are rendered with the natural width of 7 and 2 decimals.
//! 2. A double-quoted literal is copied as is. Literals are limited to [`MAX_LITERAL_LEN`] bytes,
//!    longer literals are truncated.
//! 3. An escape `\T`, `\R`, `\N`, or `\RN` (or the same with `#` instead of `\`) emits a tab, CR,
//!    LF, or CRLF.
//! 4. `U` emits the unit of the variable in front of it, `Un` with `n` being a digit pads or cuts
//!    the unit to `n` characters.
//! 5. A variable name, matched case-insensitively and by longest prefix against the variable
//!    table of the family and the built-in checksums:
//!    - `CS2`: XOR of all bytes emitted so far, 2 hex digits.
//!    - `CS4`: CRC-16/CCITT of all bytes emitted so far, 4 hex digits.
//!    - `CSX`: modulo-256 sum of all bytes emitted so far, 2 hex digits.
//!
//! Everything else, e.g., spaces between items, is skipped. A format string longer than
//! [`MAX_FORMAT_LEN`] bytes is rejected.

use std::fmt;

use tracing::debug;

use crate::{
    ProtocolError,
    checksum::{crc16_ccitt, sum_checksum, xor_checksum},
};

/// Maximum length of a quoted literal in bytes.
pub const MAX_LITERAL_LEN: usize = 64;
/// Maximum length of a format string in bytes.
pub const MAX_FORMAT_LEN: usize = 256;
/// Width of a number without width prefix.
pub const NATURAL_WIDTH: usize = 7;
/// Decimals of a number without width prefix.
pub const NATURAL_PRECISION: usize = 2;

/// The value of a variable at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A floating point number, rendered with width and precision.
    Number(f64),
    /// An integer, rendered right aligned in the given width.
    Integer(i64),
    /// Text, rendered right aligned in the given width.
    Text(String),
    /// The value is not available, rendered as stars.
    Missing,
}

/// A variable of the format language of one family.
pub trait FormatVariable: Copy + fmt::Debug + PartialEq + 'static {
    /// What the variables are evaluated against.
    type Snapshot;

    /// The variable names of the family. Matching is case-insensitive by longest prefix.
    fn table() -> &'static [(&'static str, Self)];

    /// Current value of the variable.
    fn value(&self, snapshot: &Self::Snapshot) -> Value;

    /// Unit label of the variable, `None` for unitless variables.
    fn unit(&self, snapshot: &Self::Snapshot) -> Option<String>;

    /// Unit label emitted by `U` when no variable with a unit comes before it.
    fn fallback_unit(snapshot: &Self::Snapshot) -> String;
}

/// Running checksums over the bytes emitted so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumItem {
    /// 8-bit XOR, 2 hex digits.
    Cs2,
    /// CRC-16/CCITT, 4 hex digits.
    Cs4,
    /// Modulo-256 sum, 2 hex digits.
    Csx,
}

const CHECKSUM_NAMES: [(&str, ChecksumItem); 3] = [
    ("CS2", ChecksumItem::Cs2),
    ("CS4", ChecksumItem::Cs4),
    ("CSX", ChecksumItem::Csx),
];

/// One compiled item of a format.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatItem<V> {
    /// Text that is copied to the output.
    Literal(String),
    /// A variable. Width 0 means natural formatting.
    Variable {
        /// The variable.
        variable: V,
        /// Total field width.
        width: usize,
        /// Number of decimals.
        precision: usize,
    },
    /// The unit of the previous variable. Width 0 means no padding.
    Unit {
        /// Fixed width of the unit label.
        width: usize,
    },
    /// A checksum over everything emitted before it.
    Checksum(ChecksumItem),
}

/// A compiled format string.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFormat<V> {
    items: Vec<FormatItem<V>>,
    source: String,
}

impl<V: FormatVariable> CompiledFormat<V> {
    /// The compiled items.
    pub fn items(&self) -> &[FormatItem<V>] {
        &self.items
    }

    /// The format string this format was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate this format, see [`evaluate`].
    pub fn evaluate(&self, snapshot: &V::Snapshot) -> String {
        evaluate(self, snapshot)
    }
}

/// Compile a format string.
pub fn compile<V: FormatVariable>(format: &str) -> Result<CompiledFormat<V>, ProtocolError> {
    if format.len() > MAX_FORMAT_LEN {
        return Err(ProtocolError::out_of_range(
            "format length",
            format.len() as f64,
            0,
            MAX_FORMAT_LEN as f64,
        ));
    }

    let bytes = format.as_bytes();
    let mut items = Vec::new();
    let mut width = 0;
    let mut precision = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];

        if c.is_ascii_digit() {
            let (w, next) = scan_number(bytes, pos);
            width = w;
            precision = 0;
            pos = next;
            if bytes.get(pos) == Some(&b'.') && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)
            {
                let (p, next) = scan_number(bytes, pos + 1);
                precision = p;
                pos = next;
            }
            continue;
        }

        if c == b'"' {
            let start = pos + 1;
            let end = bytes[start..]
                .iter()
                .position(|&b| b == b'"')
                .map(|len| start + len)
                .ok_or_else(|| ProtocolError::InvalidParameter("unterminated literal".into()))?;
            items.push(FormatItem::Literal(truncate(&format[start..end], MAX_LITERAL_LEN)));
            pos = end + 1;
            continue;
        }

        if c == b'\\' || c == b'#' {
            let rest = &format[pos + 1..];
            let escape = if starts_with_ignore_case(rest, "RN") {
                Some(("\r\n", 2))
            } else {
                match rest.bytes().next().map(|b| b.to_ascii_uppercase()) {
                    Some(b'T') => Some(("\t", 1)),
                    Some(b'R') => Some(("\r", 1)),
                    Some(b'N') => Some(("\n", 1)),
                    _ => None,
                }
            };
            match escape {
                Some((text, len)) => {
                    items.push(FormatItem::Literal(text.to_string()));
                    pos += 1 + len;
                }
                None => pos += 1,
            }
            continue;
        }

        if c.eq_ignore_ascii_case(&b'U') {
            let unit_width = bytes
                .get(pos + 1)
                .filter(|b| b.is_ascii_digit())
                .map(|b| (b - b'0') as usize);
            items.push(FormatItem::Unit {
                width: unit_width.unwrap_or(0),
            });
            pos += 1 + usize::from(unit_width.is_some());
            continue;
        }

        if c.is_ascii_alphabetic() {
            let rest = &format[pos..];
            if let Some((name, item)) = longest_match(rest, &CHECKSUM_NAMES) {
                items.push(FormatItem::Checksum(item));
                pos += name.len();
                continue;
            }
            if let Some((name, variable)) = longest_match(rest, V::table()) {
                items.push(FormatItem::Variable {
                    variable,
                    width,
                    precision,
                });
                width = 0;
                precision = 0;
                pos += name.len();
                continue;
            }
            debug!(position = pos, "skipping unknown format character");
        }

        // Skip one character. Multi-byte characters are skipped as a whole.
        pos += format[pos..].chars().next().map_or(1, char::len_utf8);
    }

    Ok(CompiledFormat {
        items,
        source: format.to_string(),
    })
}

/// Evaluate a compiled format against a snapshot.
///
/// Items are rendered left to right into one buffer. A checksum item sees exactly the bytes that
/// the items in front of it rendered.
pub fn evaluate<V: FormatVariable>(compiled: &CompiledFormat<V>, snapshot: &V::Snapshot) -> String {
    let mut out = String::new();
    let mut last_unit: Option<String> = None;

    for item in &compiled.items {
        match item {
            FormatItem::Literal(text) => out.push_str(text),
            FormatItem::Variable {
                variable,
                width,
                precision,
            } => {
                out.push_str(&render_value(variable.value(snapshot), *width, *precision));
                if let Some(unit) = variable.unit(snapshot) {
                    last_unit = Some(unit);
                }
            }
            FormatItem::Unit { width } => {
                let unit = last_unit
                    .clone()
                    .unwrap_or_else(|| V::fallback_unit(snapshot));
                if *width == 0 {
                    out.push_str(&unit);
                } else {
                    let unit = truncate(&unit, *width);
                    out.push_str(&format!("{unit:<width$}", width = *width));
                }
            }
            FormatItem::Checksum(kind) => {
                let emitted = out.as_bytes();
                let rendered = match kind {
                    ChecksumItem::Cs2 => format!("{:02X}", xor_checksum(emitted)),
                    ChecksumItem::Cs4 => format!("{:04X}", crc16_ccitt(emitted)),
                    ChecksumItem::Csx => format!("{:02X}", sum_checksum(emitted)),
                };
                out.push_str(&rendered);
            }
        }
    }
    out
}

/// Render one value with the given width and precision. Width 0 means natural formatting.
pub fn render_value(value: Value, width: usize, precision: usize) -> String {
    match value {
        Value::Number(number) if width == 0 => {
            format!(
                "{number:>width$.precision$}",
                width = NATURAL_WIDTH,
                precision = NATURAL_PRECISION
            )
        }
        Value::Number(number) => format!("{number:>width$.precision$}"),
        Value::Integer(number) => format!("{number:>width$}"),
        Value::Text(text) => format!("{text:>width$}"),
        Value::Missing if width == 0 => "*".repeat(NATURAL_WIDTH),
        Value::Missing => "*".repeat(width),
    }
}

fn scan_number(bytes: &[u8], start: usize) -> (usize, usize) {
    let mut value: usize = 0;
    let mut pos = start;
    while let Some(digit) = bytes.get(pos).filter(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add((digit - b'0') as usize);
        pos += 1;
    }
    (value.min(MAX_FORMAT_LEN), pos)
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn longest_match<T: Copy>(text: &str, table: &[(&'static str, T)]) -> Option<(&'static str, T)> {
    table
        .iter()
        .filter(|(name, _)| starts_with_ignore_case(text, name))
        .max_by_key(|(name, _)| name.len())
        .copied()
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Var {
        P,
        P1,
        T,
        Sn,
    }

    struct Snap {
        p: Option<f64>,
        t: f64,
    }

    impl FormatVariable for Var {
        type Snapshot = Snap;

        fn table() -> &'static [(&'static str, Self)] {
            &[("P", Var::P), ("P1", Var::P1), ("T", Var::T), ("SN", Var::Sn)]
        }

        fn value(&self, snapshot: &Snap) -> Value {
            match self {
                Var::P | Var::P1 => snapshot.p.map_or(Value::Missing, Value::Number),
                Var::T => Value::Number(snapshot.t),
                Var::Sn => Value::Text("K1234567".into()),
            }
        }

        fn unit(&self, _snapshot: &Snap) -> Option<String> {
            match self {
                Var::P | Var::P1 => Some("hPa".into()),
                Var::T => Some("'C".into()),
                Var::Sn => None,
            }
        }

        fn fallback_unit(_snapshot: &Snap) -> String {
            "hPa".into()
        }
    }

    #[fixture]
    fn snap() -> Snap {
        Snap {
            p: Some(1013.25),
            t: 21.5,
        }
    }

    fn render(format: &str, snap: &Snap) -> String {
        compile::<Var>(format).unwrap().evaluate(snap)
    }

    #[rstest]
    #[case(r#"P " " U"#, "1013.25 hPa")]
    #[case(r#"P1 " " U"#, "1013.25 hPa")]
    #[case(r#"T " " U"#, "  21.50 'C")]
    #[case(r#"5.1 T "/" P"#, " 21.5/1013.25")]
    #[case(r#"4 P"#, "1013")]
    #[case(r#"P \r\n"#, "1013.25\r\n")]
    #[case(r#"P #RN"#, "1013.25\r\n")]
    #[case(r#"P \t T"#, "1013.25\t  21.50")]
    #[case(r#"p " " u"#, "1013.25 hPa")]
    #[case(r#"U5 "|""#, "hPa  |")]
    #[case(r#"T U1"#, "  21.50'")]
    #[case(r#"SN"#, "K1234567")]
    #[case(r#"12 SN"#, "    K1234567")]
    fn test_evaluate(snap: Snap, #[case] format: &str, #[case] exp: &str) {
        assert_eq!(render(format, &snap), exp);
    }

    #[rstest]
    fn test_width_applies_to_next_variable_only(snap: Snap) {
        assert_eq!(render(r#"3.0 T "," T"#, &snap), " 22,  21.50");
    }

    #[rstest]
    fn test_missing_value() {
        let snap = Snap { p: None, t: 0.0 };
        assert_eq!(render("P", &snap), "*******");
        assert_eq!(render("4.1 P", &snap), "****");
    }

    #[rstest]
    fn test_checksum_covers_prior_output_only(snap: Snap) {
        let out = render(r#"P "," CS2"#, &snap);
        let expected = xor_checksum(b"1013.25,");
        assert_eq!(out, format!("1013.25,{expected:02X}"));
    }

    #[rstest]
    fn test_cs4_and_csx(snap: Snap) {
        let out = render(r#"P CS4 CSX"#, &snap);
        let crc = crc16_ccitt(b"1013.25");
        let with_crc = format!("1013.25{crc:04X}");
        let sum = sum_checksum(with_crc.as_bytes());
        assert_eq!(out, format!("{with_crc}{sum:02X}"));
    }

    #[rstest]
    fn test_evaluation_is_deterministic(snap: Snap) {
        let compiled = compile::<Var>(r#"P " " U " " T CS2 \r\n"#).unwrap();
        assert_eq!(compiled.evaluate(&snap), compiled.evaluate(&snap));
    }

    #[rstest]
    fn test_literal_truncated() {
        let long = "x".repeat(100);
        let compiled = compile::<Var>(&format!("\"{long}\"")).unwrap();
        assert_eq!(
            compiled.items(),
            &[FormatItem::Literal("x".repeat(MAX_LITERAL_LEN))]
        );
    }

    #[rstest]
    fn test_format_too_long() {
        let format = "P ".repeat(200);
        assert!(matches!(
            compile::<Var>(&format),
            Err(ProtocolError::OutOfRange { .. })
        ));
    }

    #[rstest]
    fn test_unterminated_literal() {
        assert!(matches!(
            compile::<Var>(r#"P "abc"#),
            Err(ProtocolError::InvalidParameter(_))
        ));
    }

    #[rstest]
    fn test_unknown_characters_skipped(snap: Snap) {
        assert_eq!(render("P,Q;", &snap), "1013.25");
    }

    #[rstest]
    fn test_compile_items() {
        let compiled = compile::<Var>(r#"5.1 P1 U3 CS2"#).unwrap();
        assert_eq!(
            compiled.items(),
            &[
                FormatItem::Variable {
                    variable: Var::P1,
                    width: 5,
                    precision: 1
                },
                FormatItem::Unit { width: 3 },
                FormatItem::Checksum(ChecksumItem::Cs2),
            ]
        );
        assert_eq!(compiled.source(), "5.1 P1 U3 CS2");
    }
}
