use std::collections::BTreeMap;
use std::iter::FusedIterator;

use chrono::{DateTime, Utc};

use crate::point::{FieldValue, Point};
use crate::precision::Precision;

/// Characters that can be escaped with a backslash in measurement names.
const MEASUREMENT_ESCAPES: &[u8] = b", ";
/// Characters that can be escaped with a backslash in tag keys, tag values and field keys.
const KEY_ESCAPES: &[u8] = b",= ";

/// The reason a line could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    /// The line starts with a comma.
    #[error("missing measurement")]
    MissingMeasurement,
    /// A tag has an empty key.
    #[error("missing tag key")]
    MissingTagKey,
    /// A tag has no `=` or an empty value.
    #[error("missing tag value")]
    MissingTagValue,
    /// The same tag key occurs twice.
    #[error("duplicate tag key {0:?}")]
    DuplicateTag(String),
    /// The line has no field section.
    #[error("missing fields")]
    MissingFields,
    /// A field has an empty key.
    #[error("missing field key")]
    MissingFieldKey,
    /// A field has no `=` or an empty value.
    #[error("missing field value")]
    MissingFieldValue,
    /// A field value is not a valid literal, or a float is not finite.
    #[error("invalid field value {0:?}")]
    InvalidFieldValue(String),
    /// A string field value has no closing quote.
    #[error("unterminated string field value")]
    UnterminatedString,
    /// The timestamp is not a signed integer.
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    /// The timestamp does not fit into 64-bit nanoseconds.
    #[error("timestamp out of range")]
    TimestampOutOfRange,
    /// The line is not valid UTF-8.
    #[error("invalid utf-8")]
    InvalidUtf8,
}

/// A line of the batch could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unable to parse line {line}: {kind}")]
pub struct ParseError {
    line: usize,
    kind: ParseErrorKind,
}

impl ParseError {
    /// The 1-based number of the offending line.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The reason the line was rejected.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

/// Iterator over the points of a line protocol batch.
///
/// Blank lines and comments are skipped. Both `\n` and `\r\n` line endings are supported. Each
/// malformed line yields an error, decoding continues with the next line.
#[derive(Clone, Debug)]
pub struct ParsePoints<'a> {
    slice: &'a [u8],
    line: usize,
    precision: Precision,
    default_timestamp: Option<i64>,
}

impl<'a> ParsePoints<'a> {
    /// Creates a parser over `slice`. Points without a timestamp are stamped with `now`,
    /// truncated to the precision.
    pub fn new(slice: &'a [u8], precision: Precision, now: DateTime<Utc>) -> Self {
        Self {
            slice,
            line: 0,
            precision,
            default_timestamp: now.timestamp_nanos_opt().map(|ns| precision.truncate(ns)),
        }
    }
}

impl Iterator for ParsePoints<'_> {
    type Item = Result<Point, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.slice.is_empty() {
                return None;
            }

            let (line, rest) = match self.slice.iter().position(|&b| b == b'\n') {
                Some(index) => (&self.slice[..index], &self.slice[index + 1..]),
                None => (self.slice, &[][..]),
            };
            self.slice = rest;
            self.line += 1;

            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let line = match std::str::from_utf8(line) {
                Ok(line) => line.trim_start(),
                Err(_) => return Some(Err(self.error(ParseErrorKind::InvalidUtf8))),
            };

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            return Some(
                parse_line(line, self.precision, self.default_timestamp)
                    .map_err(|kind| self.error(kind)),
            );
        }
    }
}

impl FusedIterator for ParsePoints<'_> {}

impl ParsePoints<'_> {
    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            line: self.line,
            kind,
        }
    }
}

fn parse_line(
    line: &str,
    precision: Precision,
    default_timestamp: Option<i64>,
) -> Result<Point, ParseErrorKind> {
    let (series, rest) =
        split_once_unescaped(line, b' ', false).ok_or(ParseErrorKind::MissingFields)?;
    let rest = rest.trim_start_matches(' ');
    let (fields, timestamp) = split_once_unescaped(rest, b' ', true).unwrap_or((rest, ""));

    let mut parts = SplitUnescaped::new(series, b',', false);
    let measurement = unescape(parts.next().unwrap_or_default(), MEASUREMENT_ESCAPES);
    if measurement.is_empty() {
        return Err(ParseErrorKind::MissingMeasurement);
    }

    let tags = parse_tags(parts)?;
    let fields = parse_fields(fields)?;

    let timestamp = timestamp.trim();
    let timestamp = if timestamp.is_empty() {
        default_timestamp.ok_or(ParseErrorKind::TimestampOutOfRange)?
    } else {
        let value = timestamp
            .parse::<i64>()
            .map_err(|_| ParseErrorKind::InvalidTimestamp(timestamp.to_owned()))?;
        precision
            .to_nanos(value)
            .ok_or(ParseErrorKind::TimestampOutOfRange)?
    };

    Ok(Point::from_parts(measurement, tags, fields, timestamp))
}

fn parse_tags<'a>(
    parts: impl Iterator<Item = &'a str>,
) -> Result<Vec<(String, String)>, ParseErrorKind> {
    let mut tags = Vec::new();
    for tag in parts {
        let (key, value) =
            split_once_unescaped(tag, b'=', false).ok_or(ParseErrorKind::MissingTagValue)?;
        if key.is_empty() {
            return Err(ParseErrorKind::MissingTagKey);
        }
        if value.is_empty() {
            return Err(ParseErrorKind::MissingTagValue);
        }
        tags.push((unescape(key, KEY_ESCAPES), unescape(value, KEY_ESCAPES)));
    }

    tags.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    if let Some(pair) = tags.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(ParseErrorKind::DuplicateTag(pair[0].0.clone()));
    }

    Ok(tags)
}

fn parse_fields(fields: &str) -> Result<BTreeMap<String, FieldValue>, ParseErrorKind> {
    if fields.is_empty() {
        return Err(ParseErrorKind::MissingFields);
    }

    let mut map = BTreeMap::new();
    for field in SplitUnescaped::new(fields, b',', true) {
        let (key, value) =
            split_once_unescaped(field, b'=', false).ok_or(ParseErrorKind::MissingFieldValue)?;
        if key.is_empty() {
            return Err(ParseErrorKind::MissingFieldKey);
        }
        if value.is_empty() {
            return Err(ParseErrorKind::MissingFieldValue);
        }
        // Later occurrences of a key win.
        map.insert(unescape(key, KEY_ESCAPES), parse_field_value(value)?);
    }

    Ok(map)
}

fn parse_field_value(raw: &str) -> Result<FieldValue, ParseErrorKind> {
    let invalid = || ParseErrorKind::InvalidFieldValue(raw.to_owned());

    if let Some(inner) = raw.strip_prefix('"') {
        let end = find_unescaped(inner, b'"', false).ok_or(ParseErrorKind::UnterminatedString)?;
        if end + 1 != inner.len() {
            return Err(invalid());
        }
        return Ok(FieldValue::Unsupported(raw.to_owned()));
    }

    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Ok(FieldValue::Boolean(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Ok(FieldValue::Boolean(false)),
        _ => {}
    }

    if let Some(digits) = raw.strip_suffix('i') {
        return digits
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| invalid());
    }

    if let Some(digits) = raw.strip_suffix('u') {
        return match digits.parse::<u64>() {
            Ok(_) => Ok(FieldValue::Unsupported(raw.to_owned())),
            Err(_) => Err(invalid()),
        };
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(FieldValue::Float(value)),
        _ => Err(invalid()),
    }
}

/// Returns the byte offset of the first `delim` that is not escaped with a backslash.
///
/// If `quoted` is set, delimiters inside double quotes are ignored as well.
fn find_unescaped(s: &str, delim: u8, quoted: bool) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut in_quotes = false;
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'\\' => {
                index += 2;
                continue;
            }
            b'"' if quoted => in_quotes = !in_quotes,
            b if b == delim && !in_quotes => return Some(index),
            _ => {}
        }
        index += 1;
    }

    None
}

fn split_once_unescaped(s: &str, delim: u8, quoted: bool) -> Option<(&str, &str)> {
    find_unescaped(s, delim, quoted).map(|index| (&s[..index], &s[index + 1..]))
}

struct SplitUnescaped<'a> {
    rest: Option<&'a str>,
    delim: u8,
    quoted: bool,
}

impl<'a> SplitUnescaped<'a> {
    fn new(s: &'a str, delim: u8, quoted: bool) -> Self {
        Self {
            rest: Some(s),
            delim,
            quoted,
        }
    }
}

impl<'a> Iterator for SplitUnescaped<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest?;
        match split_once_unescaped(rest, self.delim, self.quoted) {
            Some((item, rest)) => {
                self.rest = Some(rest);
                Some(item)
            }
            None => {
                self.rest = None;
                Some(rest)
            }
        }
    }
}

/// Removes backslashes in front of escapable characters. Other backslashes are kept.
fn unescape(s: &str, escapes: &[u8]) -> String {
    if !s.contains('\\') {
        return s.to_owned();
    }

    let mut unescaped = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if next.is_ascii() && escapes.contains(&(next as u8)) => {
                    unescaped.push(next);
                    chars.next();
                    continue;
                }
                _ => {}
            }
        }
        unescaped.push(c);
    }

    unescaped
}
