//! Utility functions for turning raw input bytes into documents
//! and command line values into parameters.
//!

use crate::{AggError, Result};
use bytes::Bytes;
use std::str::Utf8Error;

/// Borrow an entire [`Bytes`] slice as a `&str`.
///
/// Returns an error if the slice contains invalid UTF-8.
pub fn str_from_bytes(buf: &Bytes) -> std::result::Result<&str, Utf8Error> {
    std::str::from_utf8(buf.as_ref())
}

/// Split a buffer into lines without copying.
///
/// A trailing newline does not produce an empty last line, and a `\r`
/// before the newline is dropped. Empty lines in the middle are kept.
pub fn split_lines(buf: &Bytes) -> Vec<Bytes> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in buf.iter().enumerate() {
        if *b == b'\n' {
            lines.push(trim_cr(buf.slice(start..i)));
            start = i + 1;
        }
    }
    if start < buf.len() {
        lines.push(trim_cr(buf.slice(start..)));
    }
    lines
}

fn trim_cr(line: Bytes) -> Bytes {
    match line.last() {
        Some(b'\r') => line.slice(..line.len() - 1),
        _ => line,
    }
}

/// Parse a non-negative integer given on the command line.
///
/// Only ASCII digits are accepted: signs, whitespace and empty strings
/// are rejected.
pub fn parse_digits(name: &'static str, value: &str) -> Result<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AggError::invalid(
            name,
            format!("`{value}` is not a non-negative integer"),
        ));
    }
    value
        .parse::<u64>()
        .map_err(|e| AggError::invalid(name, format!("`{value}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lines_keeps_inner_empty_lines() {
        let buf = Bytes::from("a b\r\n\nc\n");
        let lines = split_lines(&buf);
        assert_eq!(lines, vec![Bytes::from("a b"), Bytes::new(), Bytes::from("c")]);
    }

    #[test]
    fn split_lines_without_trailing_newline() {
        let lines = split_lines(&Bytes::from("x\ny"));
        assert_eq!(lines, vec![Bytes::from("x"), Bytes::from("y")]);
        assert!(split_lines(&Bytes::new()).is_empty());
    }

    #[test]
    fn parse_digits_rejects_signs_and_text() {
        assert_eq!(parse_digits("K", "04").unwrap(), 4);
        assert!(parse_digits("K", "-1").is_err());
        assert!(parse_digits("H", "").is_err());
        assert!(parse_digits("H", "three").is_err());
        assert!(parse_digits("H", "99999999999999999999999").is_err());
    }
}
