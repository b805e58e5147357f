//! Keyword lookup and parameter splitting for the command grammars.

use std::str::FromStr;

/// Characters that may follow a keyword in every family.
const DEFAULT_BOUNDARIES: &[char] = &['?', '='];

/// A case-insensitive keyword table.
///
/// Lookup picks the longest keyword that the input starts with, as long as the keyword is not
/// followed by more of a word: the next character must be the end of the input, whitespace, `?`,
/// `=`, or one of the extra boundary characters of the family. This way `R` never matches inside
/// `RESET`.
#[derive(Debug, Clone, Copy)]
pub struct KeywordTable<K: 'static> {
    entries: &'static [(&'static str, K)],
    extra_boundaries: &'static [char],
}

impl<K: Copy> KeywordTable<K> {
    /// Create a new keyword table from `(keyword, kind)` pairs.
    pub const fn new(entries: &'static [(&'static str, K)]) -> Self {
        KeywordTable {
            entries,
            extra_boundaries: &[],
        }
    }

    /// Allow additional characters to end a keyword, e.g., `,` for `A,1,2`.
    pub const fn with_boundaries(mut self, boundaries: &'static [char]) -> Self {
        self.extra_boundaries = boundaries;
        self
    }

    /// Look up the keyword at the start of `input`, leading whitespace is ignored.
    ///
    /// Returns the kind of the keyword and the rest of the input after the keyword.
    pub fn lookup<'a>(&self, input: &'a str) -> Option<(K, &'a str)> {
        let input = input.trim_start();
        let mut best: Option<(usize, K)> = None;
        for (word, kind) in self.entries {
            let Some(head) = input.get(..word.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(word) {
                continue;
            }
            if !self.is_boundary(input[word.len()..].chars().next()) {
                continue;
            }
            if best.is_none_or(|(len, _)| word.len() > len) {
                best = Some((word.len(), *kind));
            }
        }
        best.map(|(len, kind)| (kind, &input[len..]))
    }

    fn is_boundary(&self, next: Option<char>) -> bool {
        match next {
            None => true,
            Some(c) => {
                c.is_whitespace()
                    || DEFAULT_BOUNDARIES.contains(&c)
                    || self.extra_boundaries.contains(&c)
            }
        }
    }
}

/// Split a parameter tail into positional fields.
///
/// A leading delimiter is dropped, so `,1,2` and `1,2` give the same fields. With a whitespace
/// delimiter, runs of whitespace count as one delimiter. Fields are trimmed.
pub fn split_params(tail: &str, delimiter: char) -> Vec<&str> {
    let tail = tail.trim();
    if delimiter.is_whitespace() {
        return tail.split_whitespace().collect();
    }
    let tail = tail.strip_prefix(delimiter).unwrap_or(tail);
    if tail.is_empty() {
        return Vec::new();
    }
    tail.split(delimiter).map(str::trim).collect()
}

/// Parse field `idx`, or return `default` if the field is missing or does not parse.
pub fn field_or<T: FromStr>(fields: &[&str], idx: usize, default: T) -> T {
    fields
        .get(idx)
        .and_then(|field| field.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse field `idx` if it is present and parses.
pub fn field<T: FromStr>(fields: &[&str], idx: usize) -> Option<T> {
    fields.get(idx).and_then(|field| field.trim().parse().ok())
}

/// A setting command: a query, a new value, or parameters that do not name a valid value.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting<T> {
    /// No parameters, report the current value.
    Query,
    /// Change the setting.
    Set(T),
    /// The parameters, as sent, that could not be interpreted.
    Invalid(String),
}

impl<T> Setting<T> {
    /// `Query` for no parameters or a lone `?`, otherwise whatever `parse` makes of the fields.
    pub fn parse(params: &[&str], parse: impl FnOnce(&[&str]) -> Option<T>) -> Self {
        if params.is_empty() || (params.len() == 1 && is_query(params[0])) {
            return Setting::Query;
        }
        match parse(params) {
            Some(value) => Setting::Set(value),
            None => Setting::Invalid(params.join(" ")),
        }
    }
}

/// True if the field is the query marker `?`.
pub fn is_query(field: &str) -> bool {
    field.trim() == "?"
}
