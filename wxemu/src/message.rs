//! One decoded line of the measurement feed.

use std::collections::BTreeMap;

/// A line of the measurement feed, decoded into `NAME=value` pairs.
///
/// Pairs are separated by commas, semicolons, or whitespace. Names are case-insensitive. Tokens
/// without `=` are ignored.
///
/// ```
/// use wxemu::ParsedMessage;
///
/// let msg = ParsedMessage::parse("P=1013.25, T=21.5 WX=RA").unwrap();
/// assert_eq!(msg.number("p"), Some(1013.25));
/// assert_eq!(msg.text("WX"), Some("RA"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMessage {
    fields: BTreeMap<String, String>,
}

impl ParsedMessage {
    /// Decode a line. Returns `None` if the line holds no `NAME=value` pair.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: BTreeMap<String, String> = line
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter_map(|token| token.split_once('='))
            .filter(|(name, _)| !name.trim().is_empty())
            .map(|(name, value)| (name.trim().to_ascii_uppercase(), value.trim().to_string()))
            .collect();
        if fields.is_empty() {
            None
        } else {
            Some(ParsedMessage { fields })
        }
    }

    /// Raw text of a field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Numeric value of a field, `None` if missing or not a number.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.text(name).and_then(|value| value.parse().ok())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
