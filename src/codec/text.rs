//! Delimited text rows and the text forms of date and time fields.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub const DEFAULT_DELIMITER: &str = "|";
pub const DEFAULT_NULL_TEXT: &str = "NULL";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Split one line into fields, ignoring a trailing line break.
pub fn split_fields<'a>(line: &'a str, delimiter: &str) -> Vec<&'a str> {
    let line = line.trim_end_matches(['\n', '\r']);
    line.split(delimiter).collect()
}

/// Join rendered fields into one line.
pub fn join_fields<I, S>(fields: I, delimiter: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            line.push_str(delimiter);
        }
        line.push_str(field.as_ref());
    }
    line
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT).ok()
}

/// Parse a timestamp; a bare date is taken as midnight.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// `HH:MM:SS` followed by exactly `digits` fractional digits.
pub fn format_time(time: &NaiveTime, digits: u8) -> String {
    let mut text = time.format("%H:%M:%S").to_string();
    push_fraction(&mut text, &time.format("%6f").to_string(), digits);
    text
}

/// `YYYY-MM-DD HH:MM:SS` followed by exactly `digits` fractional digits.
pub fn format_timestamp(ts: &NaiveDateTime, digits: u8) -> String {
    let mut text = ts.format("%Y-%m-%d %H:%M:%S").to_string();
    push_fraction(&mut text, &ts.format("%6f").to_string(), digits);
    text
}

fn push_fraction(text: &mut String, micros: &str, digits: u8) {
    let digits = usize::from(digits.min(6));
    if digits > 0 {
        text.push('.');
        text.push_str(&micros[..digits.min(micros.len())]);
    }
}
